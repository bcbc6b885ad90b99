use super::{RuntimeError, Vm};
use crate::{
  byte_code::AlignedByteCode,
  fiber::{CallFrame, FrameKind, Unwind},
  object::{Class, Closure, Instance, ListIter, Module, NativeFunction},
  value::Value,
};
use log::{debug, trace};
use quill_core::chunk::CMethod;
use std::{cell::RefCell, rc::Rc, sync::Arc};

type OpResult = Result<(), Unwind>;

impl Vm {
  /// Execute a single instruction other than `Return`
  pub(super) fn dispatch(&mut self, closure: &Rc<Closure>, op: AlignedByteCode) -> OpResult {
    match op {
      AlignedByteCode::Return => self.internal_error("Return must be handled by the loop."),
      AlignedByteCode::Null => self.fiber.push(Value::Null),
      AlignedByteCode::True => self.fiber.push(Value::Bool(true)),
      AlignedByteCode::False => self.fiber.push(Value::Bool(false)),
      AlignedByteCode::Push(index) => {
        let value = constant_value(closure, index)?;
        self.fiber.push(value);
      },
      AlignedByteCode::Pop => {
        self.fiber.pop();
      },
      AlignedByteCode::GetLocal(slot) => {
        let value = self.fiber.local(slot as usize).clone();
        self.fiber.push(value);
      },
      AlignedByteCode::SetLocal(slot) => {
        let value = self.fiber.peek(0).clone();
        self.fiber.set_local(slot as usize, value);
      },
      AlignedByteCode::Box(slot) => {
        let value = self.fiber.local(slot as usize).clone();
        self
          .fiber
          .set_local(slot as usize, Value::Box(Rc::new(RefCell::new(value))));
      },
      AlignedByteCode::NewBox(slot) => {
        self
          .fiber
          .set_local(slot as usize, Value::Box(Rc::new(RefCell::new(Value::Null))));
      },
      AlignedByteCode::GetBox(slot) => {
        let value = self.boxed(slot)?.borrow().clone();
        self.fiber.push(value);
      },
      AlignedByteCode::SetBox(slot) => {
        let value = self.fiber.peek(0).clone();
        *self.boxed(slot)?.borrow_mut() = value;
      },
      AlignedByteCode::GetCapture(index) => {
        let value = capture(closure, index)?.borrow().clone();
        self.fiber.push(value);
      },
      AlignedByteCode::SetCapture(index) => {
        let value = self.fiber.peek(0).clone();
        *capture(closure, index)?.borrow_mut() = value;
      },
      AlignedByteCode::Closure(index) => {
        let method = match closure.module().constant(index as usize) {
          Some(constant) => constant.as_method().cloned(),
          None => None,
        }
        .ok_or_else(|| RuntimeError::illegal(format!("Constant {index} is not a method.")))?;

        self.fiber.push(Value::Closure(Rc::new(Closure::new(
          method,
          Rc::clone(closure.module()),
          closure.class().cloned(),
          closure.receiver().clone(),
        ))));
      },
      AlignedByteCode::CaptureLocal(slot) => {
        let captured = self.boxed(slot)?;
        self.capture_into(captured)?;
      },
      AlignedByteCode::CaptureEnclosing(index) => {
        let captured = capture(closure, index)?;
        self.capture_into(captured)?;
      },
      AlignedByteCode::PushSelf => self.fiber.push(closure.receiver().clone()),
      AlignedByteCode::PushClass => match closure.class() {
        Some(class) => self.fiber.push(Value::Class(Rc::clone(class))),
        None => return Err(RuntimeError::illegal("No enclosing class.").into()),
      },
      AlignedByteCode::PushModule => self.fiber.push(Value::Module(Rc::clone(closure.module()))),
      AlignedByteCode::GetField(name) => {
        let name = member_name(closure, name)?;
        let receiver = self.fiber.pop();
        let value = get_member(&receiver, &name)?;
        self.fiber.push(value);
      },
      AlignedByteCode::SetField(name) => {
        let name = member_name(closure, name)?;
        let value = self.fiber.pop();
        let receiver = self.fiber.pop();
        set_member(&receiver, &name, value.clone())?;
        self.fiber.push(value);
      },
      AlignedByteCode::Bind(name) => {
        let name = member_name(closure, name)?;
        let receiver = self.fiber.pop();
        let method = get_member(&receiver, &name)?;
        if !matches!(method, Value::Closure(_) | Value::Native(_)) {
          return Err(RuntimeError::illegal(format!("'{name}' is not a method.")).into());
        }
        self.fiber.push(method);
      },
      AlignedByteCode::Call(argc) => {
        let args = self.fiber.pop_n(argc as usize);
        let callee = self.fiber.pop();
        if let Some(value) = self.push_call(callee, args)? {
          self.fiber.push(value);
        }
      },
      AlignedByteCode::Invoke(name, argc) => {
        let name = member_name(closure, name)?;
        let args = self.fiber.pop_n(argc as usize);
        let receiver = self.fiber.pop();
        let callee = get_member(&receiver, &name)?;
        if let Some(value) = self.push_call(callee, args)? {
          self.fiber.push(value);
        }
      },
      AlignedByteCode::Add
      | AlignedByteCode::Subtract
      | AlignedByteCode::Multiply
      | AlignedByteCode::Divide
      | AlignedByteCode::Modulo => {
        let right = self.fiber.pop();
        let left = self.fiber.pop();
        let value = arithmetic(op, &left, &right)?;
        self.fiber.push(value);
      },
      AlignedByteCode::Negate => {
        let value = match self.fiber.pop() {
          Value::Int(int) => Value::Int(int.wrapping_neg()),
          Value::Float(float) => Value::Float(-float),
          other => {
            return Err(
              RuntimeError::illegal(format!("Cannot negate '{}'.", other.type_name())).into(),
            )
          },
        };
        self.fiber.push(value);
      },
      AlignedByteCode::Not => {
        let value = self.fiber.pop();
        self.fiber.push(Value::Bool(!value.is_truthy()));
      },
      AlignedByteCode::Equal | AlignedByteCode::NotEqual => {
        let right = self.fiber.pop();
        let left = self.fiber.pop();
        let equal = left == right;
        self
          .fiber
          .push(Value::Bool(equal == (op == AlignedByteCode::Equal)));
      },
      AlignedByteCode::Less
      | AlignedByteCode::LessEqual
      | AlignedByteCode::Greater
      | AlignedByteCode::GreaterEqual => {
        let right = self.fiber.pop();
        let left = self.fiber.pop();
        let value = compare(op, &left, &right)?;
        self.fiber.push(value);
      },
      AlignedByteCode::And(target) => {
        if self.fiber.peek(0).is_truthy() {
          self.fiber.pop();
        } else {
          self.fiber.jump(target as usize);
        }
      },
      AlignedByteCode::Or(target) => {
        if self.fiber.peek(0).is_truthy() {
          self.fiber.jump(target as usize);
        } else {
          self.fiber.pop();
        }
      },
      AlignedByteCode::Jump(target) => self.fiber.jump(target as usize),
      AlignedByteCode::JumpIfFalse(target) => {
        if !self.fiber.pop().is_truthy() {
          self.fiber.jump(target as usize);
        }
      },
      AlignedByteCode::List(count) => {
        let values = self.fiber.pop_n(count as usize);
        self.fiber.push(Value::list(values));
      },
      AlignedByteCode::Iter => {
        let iter = match self.fiber.pop() {
          Value::List(list) => Value::Iter(Rc::new(RefCell::new(ListIter::new(list)))),
          iter @ Value::Iter(_) => iter,
          other => {
            return Err(
              RuntimeError::illegal(format!("'{}' is not iterable.", other.type_name())).into(),
            )
          },
        };
        self.fiber.push(iter);
      },
      AlignedByteCode::IterNext(slot, target) => {
        let next = match self.fiber.local(slot as usize) {
          Value::Iter(iter) => iter.borrow_mut().next(),
          _ => return Err(RuntimeError::illegal("Expected an iterator.").into()),
        };
        match next {
          Some(value) => self.fiber.push(value),
          None => self.fiber.jump(target as usize),
        }
      },
      AlignedByteCode::Throw => {
        let value = self.fiber.pop();
        return Err(RuntimeError::thrown(value).into());
      },
      AlignedByteCode::Import(name) => {
        let name = member_name(closure, name)?;
        let module = self.import_module(&name)?;
        self.fiber.push(Value::Module(module));
      },
      AlignedByteCode::InitClass => match self.fiber.pop() {
        Value::Class(class) => {
          if class.begin_init() {
            debug!("initializing class {}", class.name());
            let init = Arc::clone(class.shared_init());
            let receiver = Value::Class(Rc::clone(&class));
            self.enter(
              init,
              &class,
              receiver,
              vec![],
              FrameKind::ClassInit,
            )?;
          }
        },
        other => {
          return Err(
            RuntimeError::illegal(format!("Cannot initialize '{}'.", other.type_name())).into(),
          )
        },
      },
      AlignedByteCode::DefaultArg(slot, target) => {
        let provided = self
          .fiber
          .frame()
          .map_or(0, |frame| frame.arg_count);
        if (slot as usize) < provided {
          self.fiber.jump(target as usize);
        }
      },
    }

    Ok(())
  }

  /// Leave the innermost frame. Yields the result once the frame count
  /// reaches `bottom`
  pub(super) fn op_return(&mut self, bottom: usize, value: Value) -> Option<Value> {
    let frame = match self.fiber.pop_frame() {
      Some(frame) => frame,
      None => self.internal_error("Returned without a frame."),
    };

    let value = match frame.kind {
      FrameKind::Normal => Some(value),
      FrameKind::Construct => Some(frame.closure.receiver().clone()),
      FrameKind::Discard => None,
      FrameKind::ClassInit => {
        if let Some(class) = frame.closure.class() {
          class.finish_init();
        }
        None
      },
    };

    if self.fiber.frame_count() <= bottom {
      return Some(value.unwrap_or(Value::Null));
    }

    if let Some(value) = value {
      self.fiber.push(value);
    }
    None
  }

  /// Begin a call. Natives complete immediately and yield their result,
  /// methods and classes push frames
  pub(crate) fn push_call(&mut self, callee: Value, args: Vec<Value>) -> Result<Option<Value>, Unwind> {
    match callee {
      Value::Closure(closure) => {
        let method = closure.method();
        if !method.accepts(args.len()) {
          return Err(arity_error(&method.name, method.min_args(), method.args, args.len()).into());
        }

        let fp = self.fiber.pre_call(frame_locals(method, args.len()));
        trace!("call {} at {}", method.name, fp);
        let arg_count = args.len();
        for (slot, arg) in args.into_iter().enumerate() {
          self.fiber.set_local(slot, arg);
        }

        let base = self.fiber.stack_len();
        self
          .fiber
          .push_frame(CallFrame::new(closure, base, arg_count, FrameKind::Normal));
        Ok(None)
      },
      Value::Class(class) => {
        self.construct(class, args)?;
        Ok(None)
      },
      Value::Native(native) => self.call_native(&native, &args).map(Some),
      other => Err(RuntimeError::illegal(format!("'{}' is not callable.", other.type_name())).into()),
    }
  }

  /// Push the frames that build an instance of `class`. The instance
  /// initializer runs first and the constructor yields the instance
  fn construct(&mut self, class: Rc<Class>, args: Vec<Value>) -> Result<(), RuntimeError> {
    let instance = Value::Instance(Rc::new(Instance::new(Rc::clone(&class))));
    let init = Arc::clone(class.instance_init());

    match class.constructor().cloned() {
      Some(constructor) => {
        self.enter(constructor, &class, instance.clone(), args, FrameKind::Construct)?;
        self.enter(init, &class, instance, vec![], FrameKind::Discard)
      },
      None if args.is_empty() => self.enter(init, &class, instance, vec![], FrameKind::Construct),
      None => Err(arity_error(class.name(), 0, 0, args.len())),
    }
  }

  /// Push a frame running `method` of `class`
  fn enter(
    &mut self,
    method: Arc<CMethod>,
    class: &Rc<Class>,
    receiver: Value,
    args: Vec<Value>,
    kind: FrameKind,
  ) -> Result<(), RuntimeError> {
    if !method.accepts(args.len()) {
      return Err(arity_error(&method.name, method.min_args(), method.args, args.len()));
    }

    let closure = Rc::new(Closure::new(
      Arc::clone(&method),
      class_module(class)?,
      Some(Rc::clone(class)),
      receiver,
    ));

    self.fiber.pre_call(frame_locals(&method, args.len()));
    let arg_count = args.len();
    for (slot, arg) in args.into_iter().enumerate() {
      self.fiber.set_local(slot, arg);
    }

    let base = self.fiber.stack_len();
    self
      .fiber
      .push_frame(CallFrame::new(closure, base, arg_count, kind));
    Ok(())
  }

  pub(super) fn call_native(&mut self, native: &NativeFunction, args: &[Value]) -> Result<Value, Unwind> {
    if let Some(arity) = native.arity() {
      if arity != args.len() {
        return Err(arity_error(native.name(), arity as u32, arity as u32, args.len()).into());
      }
    }

    native.call(self, args)
  }

  /// A loaded module, or a native module linked on first import
  pub(super) fn import_module(&mut self, name: &str) -> Result<Rc<Module>, RuntimeError> {
    if let Some(module) = self.modules.get(name) {
      return Ok(Rc::clone(module));
    }

    let native = match self.env.native_module(name) {
      Some(native) if self.env.policy().allows(name) => native,
      Some(_) => {
        return Err(RuntimeError::illegal(format!(
          "Linking module '{name}' is not allowed."
        )))
      },
      None => return Err(RuntimeError::illegal(format!("Module '{name}' is not loaded."))),
    };

    debug!("linking native module '{name}'");
    let module = Rc::new(native.instantiate());
    self.modules.insert(name.to_string(), Rc::clone(&module));
    Ok(module)
  }

  fn boxed(&self, slot: i32) -> Result<Rc<RefCell<Value>>, RuntimeError> {
    match self.fiber.local(slot as usize) {
      Value::Box(boxed) => Ok(Rc::clone(boxed)),
      _ => Err(RuntimeError::illegal(format!("Local {slot} is not boxed."))),
    }
  }

  /// Add a capture to the closure on top of the stack
  fn capture_into(&mut self, captured: Rc<RefCell<Value>>) -> Result<(), RuntimeError> {
    match self.fiber.peek(0) {
      Value::Closure(target) => {
        target.push_capture(captured);
        Ok(())
      },
      _ => Err(RuntimeError::illegal("Captures must follow a closure.")),
    }
  }
}

/// The locals a frame needs, never fewer than its arguments
fn frame_locals(method: &CMethod, args: usize) -> usize {
  (method.locals as usize).max(args)
}

fn arity_error(name: &str, min: u32, max: u32, got: usize) -> RuntimeError {
  let expected = if min == max {
    format!("{max}")
  } else {
    format!("{min} to {max}")
  };

  RuntimeError::illegal(format!(
    "'{name}' expected {expected} arguments but got {got}."
  ))
}

fn constant_value(closure: &Closure, index: i32) -> Result<Value, RuntimeError> {
  closure
    .module()
    .value(index as usize)
    .cloned()
    .ok_or_else(|| RuntimeError::illegal(format!("Constant {index} is out of range.")))
}

fn member_name(closure: &Closure, index: i32) -> Result<String, RuntimeError> {
  closure
    .module()
    .name_at(index as usize)
    .map(str::to_string)
    .ok_or_else(|| RuntimeError::illegal(format!("Constant {index} is not a name.")))
}

fn capture(closure: &Closure, index: i32) -> Result<Rc<RefCell<Value>>, RuntimeError> {
  closure
    .capture(index as usize)
    .ok_or_else(|| RuntimeError::illegal(format!("Capture {index} is out of range.")))
}

fn class_module(class: &Class) -> Result<Rc<Module>, RuntimeError> {
  class
    .module()
    .ok_or_else(|| RuntimeError::illegal(format!("The module of '{}' was unloaded.", class.name())))
}

fn method_of(class: &Rc<Class>, method: &Arc<CMethod>, receiver: Value) -> Result<Value, RuntimeError> {
  Ok(Value::Closure(Rc::new(Closure::new(
    Arc::clone(method),
    class_module(class)?,
    Some(Rc::clone(class)),
    receiver,
  ))))
}

/// Look up `name` on `receiver`, binding any method found to it
pub(super) fn get_member(receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
  let found = match receiver {
    Value::Instance(instance) => instance_member(instance, receiver, name)?,
    Value::Class(class) => {
      if let Some(value) = class.shared_field(name) {
        Some(value)
      } else if let Some(method) = class.shared_method(name).or_else(|| class.method(name)) {
        Some(method_of(class, method, receiver.clone())?)
      } else {
        None
      }
    },
    Value::Module(module) => match module.field(name) {
      Some(value) => Some(value),
      None => module.method(name).map(|method| {
        Value::Closure(Rc::new(Closure::new(
          Arc::clone(method),
          Rc::clone(module),
          None,
          Value::Null,
        )))
      }),
    },
    _ => None,
  };

  found.ok_or_else(|| RuntimeError::illegal(format!("Undefined member '{name}' on {receiver}.")))
}

fn instance_member(instance: &Rc<Instance>, receiver: &Value, name: &str) -> Result<Option<Value>, RuntimeError> {
  let class = instance.class();

  if let Some(value) = instance.field(name) {
    return Ok(Some(value));
  }
  if let Some(method) = class.method(name) {
    return method_of(class, method, receiver.clone()).map(Some);
  }
  if let Some(value) = class.shared_field(name) {
    return Ok(Some(value));
  }
  if let Some(method) = class.shared_method(name) {
    return method_of(class, method, Value::Class(Rc::clone(class))).map(Some);
  }

  for name_of_trait in class.traits() {
    let delegate = instance
      .field(name_of_trait)
      .or_else(|| class.shared_field(name_of_trait));

    if let Some(delegate) = delegate.filter(|delegate| !delegate.is_null()) {
      if let Ok(value) = get_member(&delegate, name) {
        return Ok(Some(value));
      }
    }
  }

  Ok(None)
}

/// Assign the existing member `name` of `receiver`
pub(super) fn set_member(receiver: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
  let set = match receiver {
    Value::Instance(instance) => {
      instance.set_field(name, value.clone()) || instance.class().set_shared_field(name, value)
    },
    Value::Class(class) => class.set_shared_field(name, value),
    Value::Module(module) => module.set_field(name, value),
    _ => false,
  };

  if set {
    Ok(())
  } else {
    Err(RuntimeError::illegal(format!(
      "Cannot set undefined member '{name}' on {receiver}."
    )))
  }
}

fn arithmetic(op: AlignedByteCode, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
  match (left, right) {
    (Value::Int(a), Value::Int(b)) => {
      let (a, b) = (*a, *b);
      match op {
        AlignedByteCode::Add => Ok(Value::Int(a.wrapping_add(b))),
        AlignedByteCode::Subtract => Ok(Value::Int(a.wrapping_sub(b))),
        AlignedByteCode::Multiply => Ok(Value::Int(a.wrapping_mul(b))),
        AlignedByteCode::Divide if b == 0 => Err(RuntimeError::illegal("Division by zero.")),
        AlignedByteCode::Divide => Ok(Value::Int(a.wrapping_div(b))),
        AlignedByteCode::Modulo if b == 0 => Err(RuntimeError::illegal("Division by zero.")),
        _ => Ok(Value::Int(a.wrapping_rem(b))),
      }
    },
    (Value::Str(a), Value::Str(b)) if op == AlignedByteCode::Add => {
      Ok(Value::from(format!("{a}{b}")))
    },
    _ => match (as_float(left), as_float(right)) {
      (Some(a), Some(b)) => match op {
        AlignedByteCode::Add => Ok(Value::Float(a + b)),
        AlignedByteCode::Subtract => Ok(Value::Float(a - b)),
        AlignedByteCode::Multiply => Ok(Value::Float(a * b)),
        _ if b == 0.0 => Err(RuntimeError::illegal("Division by zero.")),
        AlignedByteCode::Divide => Ok(Value::Float(a / b)),
        _ => Ok(Value::Float(a % b)),
      },
      _ => Err(RuntimeError::illegal(format!(
        "Unsupported operands '{}' and '{}'.",
        left.type_name(),
        right.type_name()
      ))),
    },
  }
}

fn compare(op: AlignedByteCode, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
  let ordering = match (left, right) {
    (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
    (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
    _ => match (as_float(left), as_float(right)) {
      (Some(a), Some(b)) => a.partial_cmp(&b),
      _ => {
        return Err(RuntimeError::illegal(format!(
          "Cannot compare '{}' and '{}'.",
          left.type_name(),
          right.type_name()
        )))
      },
    },
  };

  let result = match ordering {
    Some(ordering) => match op {
      AlignedByteCode::Less => ordering.is_lt(),
      AlignedByteCode::LessEqual => ordering.is_le(),
      AlignedByteCode::Greater => ordering.is_gt(),
      _ => ordering.is_ge(),
    },
    // NaN compares false
    None => false,
  };

  Ok(Value::Bool(result))
}

fn as_float(value: &Value) -> Option<f64> {
  match value {
    Value::Int(int) => Some(*int as f64),
    Value::Float(float) => Some(*float),
    _ => None,
  }
}
