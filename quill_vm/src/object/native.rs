use crate::{fiber::StepResult, value::Value, vm::Vm};
use std::{fmt, rc::Rc};

/// The host function behind a native
pub type NativeFn = Rc<dyn Fn(&mut Vm, &[Value]) -> StepResult>;

/// A function implemented by the host
pub struct NativeFunction {
  name: String,

  /// The exact argument count, `None` when variadic
  arity: Option<usize>,

  fun: NativeFn,
}

impl NativeFunction {
  pub fn new(name: impl Into<String>, arity: Option<usize>, fun: NativeFn) -> Self {
    Self {
      name: name.into(),
      arity,
      fun,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn arity(&self) -> Option<usize> {
    self.arity
  }

  pub fn call(&self, vm: &mut Vm, args: &[Value]) -> StepResult {
    (self.fun)(vm, args)
  }
}

impl fmt::Debug for NativeFunction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NativeFunction")
      .field("name", &self.name)
      .field("arity", &self.arity)
      .finish()
  }
}
