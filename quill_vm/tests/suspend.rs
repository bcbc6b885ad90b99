mod support;

use quill_vm::{
  compiler::ir::ast::{AstBuilder, BinaryOp},
  env::NativeModule,
  fiber::{FiberState, Step, StepResult},
  value::Value,
  vm::{ExecuteResult, RuntimeErrorKind, Vm},
};
use std::{cell::RefCell, io, rc::Rc, thread, time::Duration};
use support::{assert_loaded, assert_returns, assert_stdout, call, print, ret, run_main, std_import, test_vm_with};

/// `pause(value)` suspends with cause "pause" and `value` as its partial
fn host() -> NativeModule {
  NativeModule::new("host").with_function("pause", Some(1), |vm, args| {
    Err(vm.suspend(Value::from("pause"), args[0].clone(), vec![]))
  })
}

fn import_host(b: &mut AstBuilder) -> quill_vm::compiler::ir::ast::NodeId {
  b.import("host", &[("pause", None)])
}

#[test]
fn scripts_pause_and_resume() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  // print("before") var x = pause(10) print("after") return x * 2
  let std = std_import(&mut b);
  let host = import_host(&mut b);
  let before = b.string("before");
  let before = print(&mut b, vec![before]);
  let ten = b.int(10);
  let paused = call(&mut b, "pause", vec![ten]);
  let x = b.var("x", Some(paused));
  let after = b.string("after");
  let after = print(&mut b, vec![after]);
  let x_ref = b.id("x");
  let two = b.int(2);
  let product = b.binary(BinaryOp::Multiply, x_ref, two);
  let done = ret(&mut b, product);
  let main = b.method("main", vec![], vec![before, x, after, done]);
  let ast = b.module("main", vec![std, host, main]);

  let result = run_main(&mut vm, ast)?;
  assert_eq!(result, ExecuteResult::Suspended(Value::from("pause")));
  assert_eq!(vm.fiber_state(), FiberState::Suspended);
  assert_stdout(&container, &["before"])?;

  let result = vm.resume();
  assert_returns(&container, result, Value::Int(20))?;
  assert_eq!(vm.fiber_state(), FiberState::Returned);
  assert_stdout(&container, &["before", "after"])
}

#[test]
fn statements_after_a_pause_run_once() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  // print("first") pause(2) print("third")
  let std = std_import(&mut b);
  let host = import_host(&mut b);
  let first = b.string("first");
  let first = print(&mut b, vec![first]);
  let two = b.int(2);
  let paused = call(&mut b, "pause", vec![two]);
  let second = b.expr(paused);
  let third = b.string("third");
  let third = print(&mut b, vec![third]);
  let main = b.method("main", vec![], vec![first, second, third]);
  let ast = b.module("main", vec![std, host, main]);

  let result = run_main(&mut vm, ast)?;
  assert_eq!(result, ExecuteResult::Suspended(Value::from("pause")));
  assert_stdout(&container, &["first"])?;

  let result = vm.resume();
  assert_returns(&container, result, Value::Null)?;
  assert_stdout(&container, &["first", "third"])?;

  assert!(matches!(vm.resume(), ExecuteResult::RuntimeError(_)));
  assert_stdout(&container, &["first", "third"])
}

#[test]
fn resumed_values_replace_the_partial() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  let host = import_host(&mut b);
  let one = b.int(1);
  let paused = call(&mut b, "pause", vec![one]);
  let done = ret(&mut b, paused);
  let main = b.method("main", vec![], vec![done]);
  let ast = b.module("main", vec![host, main]);

  let result = run_main(&mut vm, ast)?;
  assert!(matches!(result, ExecuteResult::Suspended(_)));

  let result = vm.resume_with(Value::from("given"));
  assert_returns(&container, result, Value::from("given"))
}

#[test]
fn resumed_errors_reach_script_handlers() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  // try { pause(1) return "no" } catch e { return e }
  let host = import_host(&mut b);
  let one = b.int(1);
  let paused = call(&mut b, "pause", vec![one]);
  let stmt = b.expr(paused);
  let no = b.string("no");
  let no = ret(&mut b, no);
  let body = b.block(vec![stmt, no]);
  let e = b.id("e");
  let caught = ret(&mut b, e);
  let catch = b.block(vec![caught]);
  let try_ = b.try_catch(body, "e", catch);
  let main = b.method("main", vec![], vec![try_]);
  let ast = b.module("main", vec![host, main]);

  let result = run_main(&mut vm, ast)?;
  assert!(matches!(result, ExecuteResult::Suspended(_)));

  let result = vm.resume_with_error(Value::from("boom"));
  assert_returns(&container, result, Value::from("boom"))
}

#[test]
fn uncaught_resumed_errors_fail_the_fiber() -> io::Result<()> {
  let (mut vm, _container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  let host = import_host(&mut b);
  let one = b.int(1);
  let paused = call(&mut b, "pause", vec![one]);
  let done = ret(&mut b, paused);
  let main = b.method("main", vec![], vec![done]);
  let ast = b.module("main", vec![host, main]);

  run_main(&mut vm, ast)?;
  match vm.resume_with_error(Value::from("boom")) {
    ExecuteResult::RuntimeError(error) => {
      assert_eq!(error.kind, RuntimeErrorKind::Thrown(Value::from("boom")))
    },
    other => panic!("expected a runtime error but got {other:?}"),
  }
  assert_eq!(vm.fiber_state(), FiberState::Failed);
  assert!(matches!(vm.resume(), ExecuteResult::RuntimeError(_)));
  Ok(())
}

#[test]
fn steps_run_exactly_once() -> io::Result<()> {
  let log = Rc::new(RefCell::new(Vec::<String>::new()));

  let staged = {
    let log = Rc::clone(&log);
    move |vm: &mut Vm, _args: &[Value]| {
      let first: Step = {
        let log = Rc::clone(&log);
        Rc::new(move |_: &mut Vm, _: Value| -> StepResult {
          log.borrow_mut().push("first".to_string());
          Ok(Value::Int(10))
        })
      };
      let second: Step = {
        let log = Rc::clone(&log);
        Rc::new(move |vm: &mut Vm, value: Value| -> StepResult {
          log.borrow_mut().push("second:suspend".to_string());
          let resumed: Step = {
            let log = Rc::clone(&log);
            Rc::new(move |_: &mut Vm, value: Value| -> StepResult {
              log.borrow_mut().push("second:resume".to_string());
              Ok(value)
            })
          };
          let partial = match value {
            Value::Int(int) => Value::Int(int + 10),
            other => other,
          };
          Err(vm.suspend(Value::from("wait"), partial, vec![resumed]))
        })
      };
      let third: Step = {
        let log = Rc::clone(&log);
        Rc::new(move |_: &mut Vm, value: Value| -> StepResult {
          log.borrow_mut().push("third".to_string());
          match value {
            Value::Int(int) => Ok(Value::Int(int * 3)),
            other => Ok(other),
          }
        })
      };

      vm.run_steps(&[first, second, third], Value::Null)
    }
  };
  let module = NativeModule::new("host").with_function("staged", Some(0), staged);
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(module));

  let mut b = AstBuilder::new();
  let import = b.import("host", &[("staged", None)]);
  let staged = call(&mut b, "staged", vec![]);
  let done = ret(&mut b, staged);
  let main = b.method("main", vec![], vec![done]);
  let ast = b.module("main", vec![import, main]);

  let result = run_main(&mut vm, ast)?;
  assert_eq!(result, ExecuteResult::Suspended(Value::from("wait")));
  assert_eq!(*log.borrow(), vec!["first", "second:suspend"]);

  let result = vm.resume();
  assert_returns(&container, result, Value::Int(60))?;
  assert_eq!(
    *log.borrow(),
    vec!["first", "second:suspend", "second:resume", "third"]
  );
  Ok(())
}

#[test]
fn natives_calling_suspending_scripts_resume_in_order() -> io::Result<()> {
  // twice(f) calls f two times and sums the results
  let twice = |vm: &mut Vm, args: &[Value]| {
    let first = Rc::new(RefCell::new(Value::Null));
    let callee = args[0].clone();

    let call_first: Step = {
      let callee = callee.clone();
      Rc::new(move |vm: &mut Vm, _: Value| vm.call_value(&callee, &[]))
    };
    let call_second: Step = {
      let first = Rc::clone(&first);
      Rc::new(move |vm: &mut Vm, value: Value| -> StepResult {
        *first.borrow_mut() = value;
        vm.call_value(&callee, &[])
      })
    };
    let sum: Step = Rc::new(move |_: &mut Vm, value: Value| -> StepResult {
      match (&*first.borrow(), value) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (a, b) => Ok(Value::list(vec![a.clone(), b])),
      }
    });

    vm.run_steps(&[call_first, call_second, sum], Value::Null)
  };
  let module = host().with_function("twice", Some(1), twice);
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(module));

  // fn add() { return pause(3) }  fn main() { return twice(add) }
  let mut b = AstBuilder::new();
  let import = b.import("host", &[("pause", None), ("twice", None)]);
  let three = b.int(3);
  let paused = call(&mut b, "pause", vec![three]);
  let body = ret(&mut b, paused);
  let add = b.method("add", vec![], vec![body]);
  let add_ref = b.id("add");
  let twice = call(&mut b, "twice", vec![add_ref]);
  let body = ret(&mut b, twice);
  let main = b.method("main", vec![], vec![body]);
  let ast = b.module("main", vec![import, add, main]);

  let result = run_main(&mut vm, ast)?;
  assert_eq!(result, ExecuteResult::Suspended(Value::from("pause")));

  let result = vm.resume();
  assert_eq!(result, ExecuteResult::Suspended(Value::from("pause")));

  let result = vm.resume();
  assert_returns(&container, result, Value::Int(6))
}

#[test]
fn interrupts_stop_running_loops() -> io::Result<()> {
  let (mut vm, _container) = test_vm_with(|env| env);
  let mut b = AstBuilder::new();

  // try { while true {} } catch e { return "caught" }
  let t = b.bool(true);
  let body = b.block(vec![]);
  let spin = b.while_(t, body);
  let body = b.block(vec![spin]);
  let caught = b.string("caught");
  let caught = ret(&mut b, caught);
  let catch = b.block(vec![caught]);
  let try_ = b.try_catch(body, "e", catch);
  let main = b.method("main", vec![], vec![try_]);
  let ast = b.module("main", vec![main]);
  assert_loaded(vm.run(ast))?;

  let handle = vm.interrupt_handle();
  let interrupter = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    handle.interrupt();
  });

  let result = vm.call("main", "main", vec![]);
  interrupter.join().expect("interrupter panicked");

  match result {
    ExecuteResult::RuntimeError(error) => assert!(error.is_interrupt()),
    other => panic!("expected an interrupt but got {other:?}"),
  }

  // the interrupt was consumed
  assert!(!vm.interrupt_handle().is_interrupted());
  Ok(())
}

#[test]
fn interrupts_raised_while_idle_are_dropped() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env);
  let mut b = AstBuilder::new();

  let one = b.int(1);
  let done = ret(&mut b, one);
  let main = b.method("main", vec![], vec![done]);
  let ast = b.module("main", vec![main]);
  assert_loaded(vm.run(ast))?;

  vm.interrupt_handle().interrupt();
  let result = vm.call("main", "main", vec![]);
  assert_returns(&container, result, Value::Int(1))
}

#[test]
fn interrupts_target_their_own_fiber() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  // fn main(n) { return pause(n) } fn one() { return 1 }
  let host = import_host(&mut b);
  let n = b.param("n");
  let n_ref = b.id("n");
  let paused = call(&mut b, "pause", vec![n_ref]);
  let done = ret(&mut b, paused);
  let main = b.method("main", vec![n], vec![done]);
  let value = b.int(1);
  let done = ret(&mut b, value);
  let one = b.method("one", vec![], vec![done]);
  let ast = b.module("main", vec![host, main, one]);
  assert_loaded(vm.run(ast))?;

  assert!(matches!(
    vm.call("main", "main", vec![Value::Int(5)]),
    ExecuteResult::Suspended(_)
  ));
  let handle = vm.interrupt_handle();
  let parked = vm.park();
  handle.interrupt();

  let result = vm.call("main", "one", vec![]);
  assert_returns(&container, result, Value::Int(1))?;

  vm.unpark(parked);
  match vm.resume() {
    ExecuteResult::RuntimeError(error) => assert!(error.is_interrupt()),
    other => panic!("expected an interrupt but got {other:?}"),
  }
  assert_eq!(vm.fiber_state(), FiberState::Failed);
  Ok(())
}

#[test]
fn parked_fibers_resume_independently() -> io::Result<()> {
  let (mut vm, container) = test_vm_with(|env| env.with_native_module(host()));
  let mut b = AstBuilder::new();

  // fn main(n) { return pause(n) * 2 }
  let host = import_host(&mut b);
  let n = b.param("n");
  let n_ref = b.id("n");
  let paused = call(&mut b, "pause", vec![n_ref]);
  let two = b.int(2);
  let product = b.binary(BinaryOp::Multiply, paused, two);
  let done = ret(&mut b, product);
  let main = b.method("main", vec![n], vec![done]);
  let ast = b.module("main", vec![host, main]);
  assert_loaded(vm.run(ast))?;

  assert!(matches!(
    vm.call("main", "main", vec![Value::Int(1)]),
    ExecuteResult::Suspended(_)
  ));
  let first = vm.park();
  assert_eq!(vm.fiber_state(), FiberState::Created);

  assert!(matches!(
    vm.call("main", "main", vec![Value::Int(2)]),
    ExecuteResult::Suspended(_)
  ));
  let second = vm.park();

  vm.unpark(first);
  let result = vm.resume();
  assert_returns(&container, result, Value::Int(2))?;

  vm.unpark(second);
  let result = vm.resume();
  assert_returns(&container, result, Value::Int(4))
}
