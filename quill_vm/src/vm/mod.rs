mod error;
mod hooks;
mod loader;
mod ops;

pub use error::{RuntimeError, RuntimeErrorKind, TraceEntry};

use crate::{
  byte_code::AlignedByteCode,
  compiler::{ir::ast::Ast, report_diagnostics, Compiler},
  env::Environment,
  fiber::{Continuation, Fiber, FiberState, InterruptHandle, StepResult, Unwind},
  object::{Closure, Module},
  value::Value,
};
use codespan_reporting::{files::SimpleFiles, term::termcolor::NoColor};
use log::{debug, info, warn};
use quill_core::{
  chunk::CModule,
  import::{ImportResolverChain, ModuleResolver},
  Map,
};
use quill_env::io::Io;
use quill_native::io_native;
use std::{io::Write, mem, rc::Rc};

/// How many instructions run between checks of the interrupt flag
pub const INTERRUPT_INTERVAL: usize = 1024;

/// The outcome of running a fiber until it stops
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
  /// The fiber returned a value
  Ok(Value),

  /// The fiber suspended waiting on the cause
  Suspended(Value),

  /// An error escaped the outermost frame
  RuntimeError(RuntimeError),

  /// The module did not compile
  CompileError,
}

pub fn default_native_vm() -> Vm {
  Vm::new(Environment::standard(io_native()))
}

/// The virtual machine for the quill programming language
pub struct Vm {
  /// Registered natives, link policy and io
  env: Environment,

  /// The current fiber
  fiber: Fiber,

  /// Loaded modules by name
  modules: Map<String, Rc<Module>>,

  /// The exports of compiled modules for later imports
  exports: ModuleResolver,

  /// Sources diagnostics are rendered against
  files: SimpleFiles<String, String>,
}

impl Vm {
  pub fn new(env: Environment) -> Self {
    Self {
      env,
      fiber: Fiber::new(),
      modules: Map::default(),
      exports: ModuleResolver::default(),
      files: SimpleFiles::new(),
    }
  }

  pub fn io(&self) -> &Io {
    self.env.io()
  }

  pub fn env(&self) -> &Environment {
    &self.env
  }

  /// A loaded module
  pub fn module(&self, name: &str) -> Option<Rc<Module>> {
    self.modules.get(name).cloned()
  }

  pub fn fiber_state(&self) -> FiberState {
    self.fiber.state()
  }

  /// A handle that may interrupt the current fiber from another thread.
  /// A fiber started over a finished one keeps its handle
  pub fn interrupt_handle(&self) -> InterruptHandle {
    self.fiber.interrupt_handle()
  }

  /// Compile a module reporting any diagnostics to stderr
  pub fn compile(&mut self, ast: Ast, source: &str) -> Option<CModule> {
    let name = ast.name().to_string();
    let file_id = self.files.add(name, source.to_string());

    let chain = ImportResolverChain::new()
      .with(&self.env)
      .with(&self.exports);
    let compiler = Compiler::new(file_id, &chain);

    match compiler.compile(ast) {
      Ok(module) => {
        #[cfg(feature = "debug")]
        {
          let mut stdio = self.env.io().stdio();
          if let Err(error) = crate::debug::disassemble_module(stdio.stdout(), &module) {
            warn!("unable to disassemble: {error}");
          }
        }
        Some(module)
      },
      Err(diagnostics) => {
        let mut stdio = self.env.io().stdio();
        let mut out = NoColor::new(stdio.stderr());
        if let Err(error) = report_diagnostics(&self.files, &diagnostics, &mut out) {
          warn!("unable to report diagnostics: {error}");
        }
        None
      },
    }
  }

  /// Compile and load a module with no source text
  pub fn run(&mut self, ast: Ast) -> ExecuteResult {
    self.run_source(ast, "")
  }

  /// Compile and load a module, rendering diagnostics against `source`
  pub fn run_source(&mut self, ast: Ast, source: &str) -> ExecuteResult {
    match self.compile(ast, source) {
      Some(module) => self.load(module),
      None => ExecuteResult::CompileError,
    }
  }

  /// Link, register and initialize a compiled module. A module whose
  /// initializer fails is unregistered
  pub fn load(&mut self, module: CModule) -> ExecuteResult {
    if let Err(error) = self.link(&module) {
      self.report(&error);
      return ExecuteResult::RuntimeError(error);
    }

    let (loaded, init) = loader::instantiate(&module);
    let name = module.name.clone();
    info!("loading module '{name}'");

    self.modules.insert(name.clone(), Rc::clone(&loaded));
    self.exports.add(&module);

    let init = match init {
      Some(init) => init,
      None => return ExecuteResult::Ok(Value::Module(loaded)),
    };

    let callee = Value::Closure(Rc::new(Closure::new(
      init,
      Rc::clone(&loaded),
      None,
      Value::Module(Rc::clone(&loaded)),
    )));

    match self.start(callee, vec![]) {
      ExecuteResult::Ok(_) => ExecuteResult::Ok(Value::Module(loaded)),
      ExecuteResult::RuntimeError(error) => {
        debug!("unloading module '{name}'");
        self.modules.remove(&name);
        self.exports.remove(&name);
        ExecuteResult::RuntimeError(error)
      },
      result => result,
    }
  }

  /// Check every import of `module` names a linkable module that
  /// exports the imported symbols
  fn link(&self, module: &CModule) -> Result<(), RuntimeError> {
    for import in &module.imports {
      let missing = match self.modules.get(&import.module) {
        Some(loaded) => import.symbols.iter().find(|symbol| !loaded.exports(symbol)),
        None => match self.env.native_module(&import.module) {
          Some(native) if self.env.policy().allows(&import.module) => import
            .symbols
            .iter()
            .find(|symbol| !native.exports(symbol)),
          Some(_) => {
            return Err(RuntimeError::illegal(format!(
              "Linking module '{}' is not allowed.",
              import.module
            )))
          },
          None => {
            return Err(RuntimeError::illegal(format!(
              "Module '{}' is not loaded.",
              import.module
            )))
          },
        },
      };

      if let Some(missing) = missing {
        return Err(RuntimeError::illegal(format!(
          "Module '{}' does not export '{}'.",
          import.module, missing
        )));
      }
    }

    Ok(())
  }

  /// Call a member of a loaded module on a fresh fiber
  pub fn call(&mut self, module: &str, name: &str, args: Vec<Value>) -> ExecuteResult {
    let module = match self.module(module) {
      Some(module) => module,
      None => {
        return ExecuteResult::RuntimeError(RuntimeError::illegal(format!(
          "Module '{module}' is not loaded."
        )))
      },
    };

    self.invoke(Value::Module(module), name, args)
  }

  /// Call a member of `receiver` on a fresh fiber
  pub fn invoke(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> ExecuteResult {
    match ops::get_member(&receiver, name) {
      Ok(callee) => self.start(callee, args),
      Err(error) => ExecuteResult::RuntimeError(error),
    }
  }

  /// Call `callee` on a fresh fiber. A suspended fiber is discarded
  /// along with its interrupt handle, interrupts raised before the
  /// call are dropped
  pub fn start(&mut self, callee: Value, args: Vec<Value>) -> ExecuteResult {
    self.fiber = match self.fiber.state() {
      FiberState::Suspended => {
        warn!(
          "discarding a fiber with {} suspensions",
          self.fiber.suspension_count()
        );
        Fiber::new()
      },
      _ => Fiber::with_interrupt(self.fiber.interrupt_flag()),
    };
    self.fiber.set_state(FiberState::Running);

    let result = self.call_value(&callee, &args);
    self.finish(result)
  }

  /// Resume the suspended fiber with the partial value of its
  /// latest suspension
  pub fn resume(&mut self) -> ExecuteResult {
    let partial = self.fiber.pending_partial();
    self.resume_with(partial)
  }

  /// Resume the suspended fiber, `value` becomes the result of the
  /// operation that suspended
  pub fn resume_with(&mut self, value: Value) -> ExecuteResult {
    self.continue_fiber(Ok(value))
  }

  /// Resume the suspended fiber by throwing `error` from the
  /// operation that suspended
  pub fn resume_with_error(&mut self, error: Value) -> ExecuteResult {
    self.continue_fiber(Err(RuntimeError::thrown(error)))
  }

  fn continue_fiber(&mut self, mut incoming: Result<Value, RuntimeError>) -> ExecuteResult {
    if self.fiber.state() != FiberState::Suspended {
      return ExecuteResult::RuntimeError(RuntimeError::illegal("Fiber is not suspended."));
    }
    self.fiber.set_state(FiberState::Running);

    while let Some(continuation) = self.fiber.pop_suspension() {
      match self.run_continuation(continuation, incoming) {
        Ok(value) => incoming = Ok(value),
        Err(Unwind::Suspend) => return self.finish(Err(Unwind::Suspend)),
        Err(Unwind::Error(error)) => incoming = Err(error),
      }
    }

    self.finish(incoming.map_err(Unwind::Error))
  }

  fn run_continuation(
    &mut self,
    continuation: Continuation,
    incoming: Result<Value, RuntimeError>,
  ) -> StepResult {
    match continuation {
      Continuation::Steps { steps, .. } => {
        let value = incoming?;
        self.run_steps(&steps, value)
      },
      Continuation::Frames(snapshot) => {
        let bottom = self.fiber.frame_count();
        self.fiber.restore(snapshot);

        match incoming {
          Ok(value) => self.fiber.push(value),
          Err(error) => self.unwind(bottom, error)?,
        }
        self.execute(bottom)
      },
    }
  }

  fn finish(&mut self, result: StepResult) -> ExecuteResult {
    match result {
      Ok(value) => {
        self.fiber.set_state(FiberState::Returned);
        ExecuteResult::Ok(value)
      },
      Err(Unwind::Suspend) => {
        self.fiber.end_unwind();
        self.fiber.set_state(FiberState::Suspended);
        debug!(
          "fiber suspended with {} continuations",
          self.fiber.suspension_count()
        );
        ExecuteResult::Suspended(self.fiber.cause().clone())
      },
      Err(Unwind::Error(error)) => {
        self.fiber.clear();
        self.fiber.set_state(FiberState::Failed);
        self.report(&error);
        ExecuteResult::RuntimeError(error)
      },
    }
  }

  /// Print an unhandled error to stderr
  fn report(&self, error: &RuntimeError) {
    let mut stdio = self.env.io().stdio();
    if let Err(io_error) = writeln!(stdio.stderr(), "{error}") {
      warn!("unable to report runtime error: {io_error}");
    }
  }

  /// Set aside the current fiber, leaving a fresh one in its place
  pub fn park(&mut self) -> Fiber {
    mem::replace(&mut self.fiber, Fiber::new())
  }

  /// Make `fiber` current returning the fiber it replaces
  pub fn unpark(&mut self, fiber: Fiber) -> Fiber {
    mem::replace(&mut self.fiber, fiber)
  }

  /// Run the current fiber until the frame count drops to `bottom`
  pub(crate) fn execute(&mut self, bottom: usize) -> StepResult {
    let mut ticks: usize = 0;

    loop {
      if ticks % INTERRUPT_INTERVAL == 0 && self.fiber.take_interrupt() {
        debug!("fiber interrupted");
        self.unwind(bottom, RuntimeError::interrupted())?;
      }
      ticks = ticks.wrapping_add(1);

      let (closure, ip) = match self.fiber.frame() {
        Some(frame) => (Rc::clone(&frame.closure), frame.ip),
        None => self.internal_error("Executing without a frame."),
      };
      let code = &closure.method().code;

      // running off the end is an implicit null return
      if ip >= code.len() {
        if let Some(value) = self.op_return(bottom, Value::Null) {
          return Ok(value);
        }
        continue;
      }

      let op = match AlignedByteCode::decode(code, ip) {
        Ok((op, next)) => {
          self.fiber.advance(ip, next);
          op
        },
        Err(error) => {
          self.fiber.advance(ip, code.len());
          self.unwind(bottom, RuntimeError::illegal(error.to_string()))?;
          continue;
        },
      };

      #[cfg(feature = "debug")]
      self.print_instruction(&closure, ip);

      let result = match op {
        AlignedByteCode::Return => {
          let value = self.fiber.pop();
          match self.op_return(bottom, value) {
            Some(value) => return Ok(value),
            None => continue,
          }
        },
        op => self.dispatch(&closure, op),
      };

      match result {
        Ok(()) => (),
        Err(Unwind::Error(error)) => self.unwind(bottom, error)?,
        Err(Unwind::Suspend) => {
          let continuation = self.fiber.capture(bottom);
          self.fiber.push_suspension(continuation);
          return Err(Unwind::Suspend);
        },
      }
    }
  }

  #[cfg(feature = "debug")]
  fn print_instruction(&self, closure: &Closure, ip: usize) {
    let mut stdio = self.env.io().stdio();
    let method = closure.method();
    let pool = closure.module().pool();

    if let Err(error) = crate::debug::disassemble_instruction(stdio.stdout(), method, pool, ip) {
      warn!("unable to disassemble: {error}");
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{compiler::ir::ast::AstBuilder, object::InitState};
  use quill_env::{
    io::Io,
    stdio::support::{IoStdioTest, StdioTestContainer},
  };

  fn test_vm() -> (Vm, Rc<StdioTestContainer>) {
    let container = Rc::new(StdioTestContainer::default());
    let io = Io::new(Rc::new(IoStdioTest::new(&container)));
    (Vm::new(Environment::standard(io)), container)
  }

  mod load {
    use super::*;

    #[test]
    fn module_is_registered() {
      let (mut vm, _) = test_vm();
      let mut b = AstBuilder::new();
      let one = b.int(1);
      let x = b.var("x", Some(one));
      let ast = b.module("main", vec![x]);

      assert!(matches!(vm.run(ast), ExecuteResult::Ok(Value::Module(_))));
      let module = vm.module("main").expect("module missing");
      assert_eq!(module.field("x"), Some(Value::Int(1)));
    }

    #[test]
    fn failed_initializer_unregisters() {
      let (mut vm, container) = test_vm();
      let mut b = AstBuilder::new();
      let boom = b.string("boom");
      let throw = b.throw(boom);
      let ast = b.module("main", vec![throw]);

      match vm.run(ast) {
        ExecuteResult::RuntimeError(error) => {
          assert_eq!(error.kind, RuntimeErrorKind::Thrown(Value::from("boom")))
        },
        result => panic!("unexpected {result:?}"),
      }
      assert!(vm.module("main").is_none());
      assert!(container.stderr.contents().contains("Error: boom"));
    }

    #[test]
    fn failed_shared_initializer_runs_again() {
      let (mut vm, _) = test_vm();
      let mut b = AstBuilder::new();

      // fn fail() { throw "boom" }
      let boom = b.string("boom");
      let throw = b.throw(boom);
      let fail = b.method("fail", vec![], vec![throw]);

      // class Foo { shared var count = fail() }
      let callee = b.id("fail");
      let value = b.call(callee, vec![]);
      let count = b.shared_var("count", Some(value));
      let class = b.class("Foo", vec![count]);
      let ast = b.module("main", vec![fail, class]);

      let module = vm.compile(ast, "").expect("compile failed");
      let (loaded, init) = loader::instantiate(&module);
      let class = match loaded.field("Foo") {
        Some(Value::Class(class)) => class,
        other => panic!("expected a class but got {other:?}"),
      };
      let init = Value::Closure(Rc::new(Closure::new(
        init.expect("initializer missing"),
        Rc::clone(&loaded),
        None,
        Value::Module(Rc::clone(&loaded)),
      )));

      for _ in 0..2 {
        match vm.start(init.clone(), vec![]) {
          ExecuteResult::RuntimeError(error) => {
            assert_eq!(error.kind, RuntimeErrorKind::Thrown(Value::from("boom")));
            assert!(error
              .trace
              .iter()
              .any(|entry| entry.method.ends_with(quill_core::constants::CLASS_INIT)));
          },
          result => panic!("unexpected {result:?}"),
        }
        assert_eq!(class.init_state(), InitState::Pending);
      }
      assert_eq!(class.shared_field("count"), Some(Value::Null));
    }

    #[test]
    fn unknown_import_fails_to_link() {
      let (mut vm, _) = test_vm();
      let module = CModule {
        name: "main".to_string(),
        imports: vec![quill_core::chunk::Import {
          module: "missing".to_string(),
          all: false,
          symbols: vec![],
          aliases: vec![],
        }],
        ..Default::default()
      };

      match vm.load(module) {
        ExecuteResult::RuntimeError(error) => {
          assert_eq!(
            error.kind,
            RuntimeErrorKind::Illegal("Module 'missing' is not loaded.".to_string())
          )
        },
        result => panic!("unexpected {result:?}"),
      }
    }
  }

  #[test]
  fn resume_requires_suspension() {
    let (mut vm, _) = test_vm();
    assert!(matches!(vm.resume(), ExecuteResult::RuntimeError(_)));
  }

  #[test]
  fn park_swaps_fibers() {
    let (mut vm, _) = test_vm();
    vm.fiber.set_state(FiberState::Returned);

    let parked = vm.park();
    assert_eq!(parked.state(), FiberState::Returned);
    assert_eq!(vm.fiber_state(), FiberState::Created);

    let fresh = vm.unpark(parked);
    assert_eq!(fresh.state(), FiberState::Created);
    assert_eq!(vm.fiber_state(), FiberState::Returned);
  }
}
