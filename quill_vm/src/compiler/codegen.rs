use super::{
  assembler::Assembler,
  error::{CompileError, CompileResult},
  ir::ast::{Ast, AstKind, Binding, BinaryOp, CaptureSource, LogicalOp, NodeId, UnaryOp},
};
use crate::byte_code::AlignedByteCode;
use quill_core::{
  chunk::{CClass, CMethod, CModule, Constant, ExceptionEntry, Import, Namespace, NamespaceFlags},
  constants::{CLASS_INIT, CONSTRUCTOR_PREFIX, INSTANCE_INIT},
  symbol::{Symbol, SymbolFlags},
};
use std::{mem, sync::Arc};

/// Generate the compiled module of a resolved tree
pub fn generate(ast: &Ast) -> CompileResult<CModule> {
  let root = ast.root();
  let name = match ast.kind(root) {
    AstKind::Module { name, .. } => name.clone(),
    _ => {
      return Err(CompileError::structural(
        "The root of a tree must be a module.",
        ast.node(root).span,
      ))
    },
  };

  let mut gen = CodeGen {
    ast,
    asm: Assembler::default(),
    loops: vec![],
    constructor: false,
  };

  let mut namespace = Namespace::default();
  let mut imports = vec![];

  for child in ast.children(root) {
    match ast.kind(*child) {
      AstKind::Import {
        module,
        alias,
        symbols,
        all,
      } => imports.push(Import {
        module: module.clone(),
        all: *all,
        symbols: symbols.iter().map(|symbol| symbol.name.clone()).collect(),
        aliases: if symbols.is_empty() {
          alias.iter().cloned().collect()
        } else {
          symbols
            .iter()
            .map(|symbol| symbol.alias.clone().unwrap_or_default())
            .collect()
        },
      }),
      AstKind::VarDec { name, flags } => {
        namespace.insert(name.clone(), flags.namespace_flags(), Constant::Null)
      },
      AstKind::Method { name, .. } => {
        let method = gen.method(*child)?;
        namespace.insert(
          name.clone(),
          NamespaceFlags::empty(),
          Constant::Method(Arc::new(method)),
        );
      },
      AstKind::Class { name } => {
        let class = gen.class(*child)?;
        namespace.insert(
          name.clone(),
          NamespaceFlags::empty(),
          Constant::Class(Arc::new(class)),
        );
      },
      _ => return Err(gen.structural(*child, "Unexpected module member.")),
    }
  }

  Ok(CModule {
    name,
    constants: gen.asm.take_pool(),
    imports,
    namespace,
  })
}

struct LoopLabels {
  guard: String,
  end: String,
}

struct CodeGen<'a> {
  ast: &'a Ast,

  /// The assembler of the method being generated
  asm: Assembler,

  /// Enclosing loops of the current method
  loops: Vec<LoopLabels>,

  /// Is the current method a constructor
  constructor: bool,
}

impl<'a> CodeGen<'a> {
  fn class(&mut self, id: NodeId) -> CompileResult<CClass> {
    let mut class = CClass {
      name: match self.ast.kind(id) {
        AstKind::Class { name } => name.clone(),
        _ => return Err(self.structural(id, "Expected a class.")),
      },
      ..Default::default()
    };

    for child in self.ast.children(id) {
      match self.ast.kind(*child) {
        AstKind::VarDec { name, flags } => {
          let namespace = if flags.contains(SymbolFlags::SHARED) {
            &mut class.shared
          } else {
            &mut class.instance
          };
          namespace.insert(name.clone(), flags.namespace_flags(), Constant::Null);
        },
        AstKind::Method { name, shared, .. } => {
          let method = self.method(*child)?;

          if name == CLASS_INIT {
            class.shared_init = method;
          } else if name == INSTANCE_INIT {
            class.instance_init = method;
          } else if *shared {
            class.shared.insert(
              name.clone(),
              NamespaceFlags::empty(),
              Constant::Method(Arc::new(method)),
            );
          } else {
            class.instance.insert(
              name.clone(),
              NamespaceFlags::empty(),
              Constant::Method(Arc::new(method)),
            );
          }
        },
        _ => return Err(self.structural(*child, "A class body may only contain fields and methods.")),
      }
    }

    Ok(class)
  }

  /// Generate a method with a fresh assembler sharing the module's pool
  fn method(&mut self, id: NodeId) -> CompileResult<CMethod> {
    let constructor = match self.ast.kind(id) {
      AstKind::Method { name, .. } => name.starts_with(CONSTRUCTOR_PREFIX),
      _ => return Err(self.structural(id, "Expected a method.")),
    };

    let pool = self.asm.take_pool();
    let enclosing = mem::replace(&mut self.asm, Assembler::new(pool));
    let loops = mem::take(&mut self.loops);
    let enclosing_constructor = mem::replace(&mut self.constructor, constructor);

    let result = self.method_body(id);

    let mut finished = mem::replace(&mut self.asm, enclosing);
    self.asm.give_pool(finished.take_pool());
    self.loops = loops;
    self.constructor = enclosing_constructor;

    result
  }

  fn method_body(&mut self, id: NodeId) -> CompileResult<CMethod> {
    let (lambda, locals) = match self.ast.kind(id) {
      AstKind::Method { lambda, locals, .. } => (*lambda, *locals),
      _ => return Err(self.structural(id, "Expected a method.")),
    };
    let name = match self.ast.node(id).table {
      Some(table) => self.ast.tables.get(table).name().to_string(),
      None => return Err(self.structural(id, "Method was not declared.")),
    };

    let children = self.ast.children(id);
    let (body, params) = match children.split_last() {
      Some((body, params)) => (*body, params),
      None => return Err(self.structural(id, "Method has no body.")),
    };

    self.line(id);
    let mut default_args = 0;
    for param in params {
      let slot = self.slot(*param)?;

      match self.ast.child(*param, 0) {
        Some(default) => {
          default_args += 1;
          let skip = self.asm.fresh_label("default");
          self.asm.emit_jump(AlignedByteCode::DefaultArg(slot, 0), &skip);
          self.expr(default)?;
          self.asm.emit(AlignedByteCode::SetLocal(slot));
          self.asm.emit(AlignedByteCode::Pop);
          self.asm.set_label_target(&skip);
        },
        None if default_args > 0 => {
          return Err(self.structural(*param, "Parameters with defaults must come last."))
        },
        None => (),
      }
    }

    for param in params {
      if self.is_boxed(*param) {
        let slot = self.slot(*param)?;
        self.asm.emit(AlignedByteCode::Box(slot));
      }
    }

    if lambda {
      self.expr(body)?;
      self.asm.emit(AlignedByteCode::Return);
    } else {
      self.statement(body)?;
      if !self.ends_with_return(body) {
        self.implicit_return();
      }
    }

    self
      .asm
      .finish(&name, locals, params.len() as u32, default_args)
  }

  fn statement(&mut self, id: NodeId) -> CompileResult<()> {
    let depth = self.asm.depth();
    self.line(id);

    match self.ast.kind(id) {
      AstKind::ExprStmt => {
        self.expr(self.child(id, 0)?)?;
        self.asm.emit(AlignedByteCode::Pop);
      },
      AstKind::Block => {
        for child in self.ast.children(id) {
          self.statement(*child)?;
        }
      },
      AstKind::VarDec { .. } => {
        let value = self.ast.child(id, 0);
        self.declare_local(id, |gen| match value {
          Some(value) => gen.expr(value),
          None => {
            gen.asm.emit(AlignedByteCode::Null);
            Ok(())
          },
        })?;
      },
      AstKind::Method { .. } => self.declare_local(id, |gen| gen.closure(id))?,
      AstKind::If => self.if_(id)?,
      AstKind::While => self.while_(id)?,
      AstKind::For { iterator, .. } => self.for_(id, *iterator as i32)?,
      AstKind::Break | AstKind::Continue => {
        let target = match (self.loops.last(), self.ast.kind(id)) {
          (Some(labels), AstKind::Break) => labels.end.clone(),
          (Some(labels), _) => labels.guard.clone(),
          (None, _) => return Err(self.structural(id, "Loop control outside of a loop.")),
        };
        self.asm.emit_jump(AlignedByteCode::Jump(0), &target);
      },
      AstKind::Return => {
        match self.ast.child(id, 0) {
          Some(value) => self.expr(value)?,
          None => self.default_return_value(),
        }
        self.asm.emit(AlignedByteCode::Return);
      },
      AstKind::Throw => {
        self.expr(self.child(id, 0)?)?;
        self.asm.emit(AlignedByteCode::Throw);
      },
      AstKind::Try => self.try_(id)?,
      AstKind::InitClass { .. } => {
        self.expr(self.child(id, 0)?)?;
        self.asm.emit(AlignedByteCode::InitClass);
      },
      _ => return Err(self.structural(id, "Expected a statement.")),
    }

    debug_assert_eq!(self.asm.depth(), depth, "statement left the stack unbalanced");
    Ok(())
  }

  /// Store the value produced by `value` in the slot declared by `id`
  fn declare_local(
    &mut self,
    id: NodeId,
    value: impl FnOnce(&mut Self) -> CompileResult<()>,
  ) -> CompileResult<()> {
    let slot = self.slot(id)?;

    if self.is_boxed(id) {
      self.asm.emit(AlignedByteCode::NewBox(slot));
      value(self)?;
      self.asm.emit(AlignedByteCode::SetBox(slot));
    } else {
      value(self)?;
      self.asm.emit(AlignedByteCode::SetLocal(slot));
    }

    self.asm.emit(AlignedByteCode::Pop);
    Ok(())
  }

  fn if_(&mut self, id: NodeId) -> CompileResult<()> {
    let children = self.ast.children(id);
    let end = self.asm.fresh_label("if_end");

    for pair in children.chunks(2) {
      match pair {
        [cond, then] => {
          let next = self.asm.fresh_label("if_next");
          self.expr(*cond)?;
          self.asm.emit_jump(AlignedByteCode::JumpIfFalse(0), &next);
          self.statement(*then)?;
          self.asm.emit_jump(AlignedByteCode::Jump(0), &end);
          self.asm.set_label_target(&next);
        },
        [otherwise] => self.statement(*otherwise)?,
        _ => (),
      }
    }

    self.asm.set_label_target(&end);
    Ok(())
  }

  fn while_(&mut self, id: NodeId) -> CompileResult<()> {
    let cond = self.child(id, 0)?;
    let body = self.child(id, 1)?;

    let guard = self.asm.fresh_label("while_guard");
    let end = self.asm.fresh_label("while_end");

    self.asm.set_label_target(&guard);
    self.expr(cond)?;
    self.asm.emit_jump(AlignedByteCode::JumpIfFalse(0), &end);

    self.loops.push(LoopLabels {
      guard: guard.clone(),
      end: end.clone(),
    });
    let result = self.statement(body);
    self.loops.pop();
    result?;

    self.asm.emit_jump(AlignedByteCode::Jump(0), &guard);
    self.asm.set_label_target(&end);
    Ok(())
  }

  /// The iterator lives in a hidden slot so loop control and
  /// exception handlers never have to unwind it from the stack
  fn for_(&mut self, id: NodeId, iterator: i32) -> CompileResult<()> {
    let iterable = self.child(id, 0)?;
    let body = self.child(id, 1)?;
    let slot = self.slot(id)?;

    let guard = self.asm.fresh_label("for_guard");
    let end = self.asm.fresh_label("for_end");

    self.expr(iterable)?;
    self.asm.emit(AlignedByteCode::Iter);
    self.asm.emit(AlignedByteCode::SetLocal(iterator));
    self.asm.emit(AlignedByteCode::Pop);

    self.asm.set_label_target(&guard);
    self
      .asm
      .emit_jump(AlignedByteCode::IterNext(iterator, 0), &end);
    self.asm.emit(AlignedByteCode::SetLocal(slot));
    self.asm.emit(AlignedByteCode::Pop);
    if self.is_boxed(id) {
      self.asm.emit(AlignedByteCode::Box(slot));
    }

    self.loops.push(LoopLabels {
      guard: guard.clone(),
      end: end.clone(),
    });
    let result = self.statement(body);
    self.loops.pop();
    result?;

    self.asm.emit_jump(AlignedByteCode::Jump(0), &guard);
    self.asm.set_label_target(&end);
    Ok(())
  }

  fn try_(&mut self, id: NodeId) -> CompileResult<()> {
    let body = self.child(id, 0)?;
    let catch = self.child(id, 1)?;
    let local = self.slot(catch)?;
    let after = self.asm.fresh_label("try_end");

    let start = self.asm.position();
    self.statement(body)?;
    let end = self.asm.position();
    self.asm.emit_jump(AlignedByteCode::Jump(0), &after);

    let handler = self.asm.position();
    if self.is_boxed(catch) {
      self.asm.emit(AlignedByteCode::Box(local));
    }
    for child in self.ast.children(catch) {
      self.statement(*child)?;
    }
    self.asm.set_label_target(&after);

    self.asm.add_exception(ExceptionEntry {
      start: start as u32,
      catch: handler as u32,
      end: end as u32,
      local: local as u32,
    });
    Ok(())
  }

  fn expr(&mut self, id: NodeId) -> CompileResult<()> {
    let depth = self.asm.depth();

    match self.ast.kind(id) {
      AstKind::Literal(constant) => match constant {
        Constant::Null => self.asm.emit(AlignedByteCode::Null),
        Constant::Bool(true) => self.asm.emit(AlignedByteCode::True),
        Constant::Bool(false) => self.asm.emit(AlignedByteCode::False),
        _ => {
          let index = self.asm.constant(constant.clone());
          self.asm.emit(AlignedByteCode::Push(index));
        },
      },
      AstKind::Id { name, binding } => match binding {
        Some(Binding::Local { slot, boxed, .. }) => {
          let slot = *slot as i32;
          self.asm.emit(if *boxed {
            AlignedByteCode::GetBox(slot)
          } else {
            AlignedByteCode::GetLocal(slot)
          });
        },
        Some(Binding::Capture { index }) => {
          self.asm.emit(AlignedByteCode::GetCapture(*index as i32))
        },
        None => return Err(self.structural(id, &format!("Unresolved identifier '{name}'."))),
      },
      AstKind::SelfRef => self.asm.emit(AlignedByteCode::PushSelf),
      AstKind::ClassRef => self.asm.emit(AlignedByteCode::PushClass),
      AstKind::ModuleRef => self.asm.emit(AlignedByteCode::PushModule),
      AstKind::Member { name } => {
        self.expr(self.child(id, 0)?)?;
        let name = self.name(name);
        self.asm.emit(AlignedByteCode::GetField(name));
      },
      AstKind::List => {
        let elements = self.ast.children(id);
        for element in elements {
          self.expr(*element)?;
        }
        self
          .asm
          .emit(AlignedByteCode::List(elements.len() as i32));
      },
      AstKind::Binary(op) => {
        self.expr(self.child(id, 0)?)?;
        self.expr(self.child(id, 1)?)?;
        self.asm.emit(binary_op(*op));
      },
      AstKind::Unary(op) => {
        self.expr(self.child(id, 0)?)?;
        self.asm.emit(match op {
          UnaryOp::Negate => AlignedByteCode::Negate,
          UnaryOp::Not => AlignedByteCode::Not,
        });
      },
      AstKind::Logical(op) => {
        let end = self.asm.fresh_label("logical_end");
        self.expr(self.child(id, 0)?)?;
        self.asm.emit_jump(
          match op {
            LogicalOp::And => AlignedByteCode::And(0),
            LogicalOp::Or => AlignedByteCode::Or(0),
          },
          &end,
        );
        self.expr(self.child(id, 1)?)?;
        self.asm.set_label_target(&end);
      },
      AstKind::Assign => self.assign(id)?,
      AstKind::Call => self.call(id)?,
      AstKind::MethodBind => {
        let method = match self.ast.kind(self.child(id, 0)?) {
          AstKind::Id { name, .. } => name.clone(),
          _ => return Err(self.structural(id, "A method binding must name a method.")),
        };
        self.expr(self.child(id, 1)?)?;
        let name = self.name(&method);
        self.asm.emit(AlignedByteCode::Bind(name));
      },
      AstKind::Method { .. } => self.closure(id)?,
      AstKind::ImportModule { module } => {
        let name = self.name(module);
        self.asm.emit(AlignedByteCode::Import(name));
      },
      _ => return Err(self.structural(id, "Expected an expression.")),
    }

    debug_assert_eq!(self.asm.depth(), depth + 1, "expression must push one value");
    Ok(())
  }

  fn assign(&mut self, id: NodeId) -> CompileResult<()> {
    let target = self.child(id, 0)?;
    let value = self.child(id, 1)?;

    match self.ast.kind(target) {
      AstKind::Id {
        binding: Some(Binding::Local { slot, boxed, .. }),
        ..
      } => {
        let slot = *slot as i32;
        self.expr(value)?;
        self.asm.emit(if *boxed {
          AlignedByteCode::SetBox(slot)
        } else {
          AlignedByteCode::SetLocal(slot)
        });
      },
      AstKind::Id {
        binding: Some(Binding::Capture { index }),
        ..
      } => {
        self.expr(value)?;
        self.asm.emit(AlignedByteCode::SetCapture(*index as i32));
      },
      AstKind::Member { name } => {
        self.expr(self.child(target, 0)?)?;
        self.expr(value)?;
        let name = self.name(name);
        self.asm.emit(AlignedByteCode::SetField(name));
      },
      _ => return Err(self.structural(target, "Invalid assignment target.")),
    }

    Ok(())
  }

  fn call(&mut self, id: NodeId) -> CompileResult<()> {
    let children = self.ast.children(id);
    let (callee, args) = match children.split_first() {
      Some((callee, args)) => (*callee, args),
      None => return Err(self.structural(id, "A call needs a callee.")),
    };
    let argc = args.len() as i32;

    match self.ast.kind(callee) {
      AstKind::Member { name } => {
        self.expr(self.child(callee, 0)?)?;
        for arg in args {
          self.expr(*arg)?;
        }
        let name = self.name(name);
        self.asm.emit(AlignedByteCode::Invoke(name, argc));
      },
      _ => {
        self.expr(callee)?;
        for arg in args {
          self.expr(*arg)?;
        }
        self.asm.emit(AlignedByteCode::Call(argc));
      },
    }

    Ok(())
  }

  fn closure(&mut self, id: NodeId) -> CompileResult<()> {
    let method = self.method(id)?;
    let index = self.asm.constant(Constant::Method(Arc::new(method)));
    self.asm.emit(AlignedByteCode::Closure(index));

    if let AstKind::Method { captures, .. } = self.ast.kind(id) {
      for capture in captures {
        self.asm.emit(match capture.source {
          CaptureSource::Local(slot) => AlignedByteCode::CaptureLocal(slot as i32),
          CaptureSource::Enclosing(index) => AlignedByteCode::CaptureEnclosing(index as i32),
        });
      }
    }

    Ok(())
  }

  fn default_return_value(&mut self) {
    self.asm.emit(if self.constructor {
      AlignedByteCode::PushSelf
    } else {
      AlignedByteCode::Null
    });
  }

  fn implicit_return(&mut self) {
    self.default_return_value();
    self.asm.emit(AlignedByteCode::Return);
  }

  fn ends_with_return(&self, body: NodeId) -> bool {
    self
      .ast
      .children(body)
      .last()
      .map_or(false, |last| matches!(self.ast.kind(*last), AstKind::Return))
  }

  fn line(&mut self, id: NodeId) {
    let line = self.ast.node(id).line;
    if line > 0 {
      self.asm.on_line(line);
    }
  }

  fn name(&mut self, name: &str) -> i32 {
    self.asm.constant(Constant::Str(name.to_string()))
  }

  fn child(&self, id: NodeId, index: usize) -> CompileResult<NodeId> {
    self
      .ast
      .child(id, index)
      .ok_or_else(|| self.structural(id, "Node is missing a child."))
  }

  fn symbol(&self, id: NodeId) -> CompileResult<&'a Symbol> {
    self
      .ast
      .node(id)
      .symbol
      .as_ref()
      .ok_or_else(|| self.structural(id, "Declaration has no symbol."))
  }

  fn slot(&self, id: NodeId) -> CompileResult<i32> {
    self
      .symbol(id)?
      .slot()
      .map(|slot| slot as i32)
      .ok_or_else(|| self.structural(id, "Declaration is not a local."))
  }

  fn is_boxed(&self, id: NodeId) -> bool {
    self
      .ast
      .node(id)
      .symbol
      .as_ref()
      .map_or(false, |symbol| symbol.is_upvalue())
  }

  fn structural(&self, id: NodeId, message: &str) -> CompileError {
    CompileError::structural(message, self.ast.node(id).span)
  }
}

fn binary_op(op: BinaryOp) -> AlignedByteCode {
  match op {
    BinaryOp::Add => AlignedByteCode::Add,
    BinaryOp::Subtract => AlignedByteCode::Subtract,
    BinaryOp::Multiply => AlignedByteCode::Multiply,
    BinaryOp::Divide => AlignedByteCode::Divide,
    BinaryOp::Modulo => AlignedByteCode::Modulo,
    BinaryOp::Equal => AlignedByteCode::Equal,
    BinaryOp::NotEqual => AlignedByteCode::NotEqual,
    BinaryOp::Less => AlignedByteCode::Less,
    BinaryOp::LessEqual => AlignedByteCode::LessEqual,
    BinaryOp::Greater => AlignedByteCode::Greater,
    BinaryOp::GreaterEqual => AlignedByteCode::GreaterEqual,
  }
}
