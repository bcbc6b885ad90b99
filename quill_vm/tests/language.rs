mod support;

use quill_core::symbol::SymbolFlags;
use quill_vm::{
  compiler::ir::ast::{AstBuilder, BinaryOp},
  value::Value,
  vm::{ExecuteResult, RuntimeErrorKind},
};
use std::io;
use support::{assert_loaded, assert_returns, assert_stdout, call, print, ret, run_main, set, std_import, test_vm};

#[test]
fn shared_fields_read_through_the_class() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // class Foo { shared var x = 1; fn get() { return x } }
  let one = b.int(1);
  let x = b.shared_var("x", Some(one));
  let x_ref = b.id("x");
  let body = ret(&mut b, x_ref);
  let get = b.method("get", vec![], vec![body]);
  let class = b.class("Foo", vec![x, get]);

  // fn main() { return Foo.get() }
  let foo = b.id("Foo");
  let invoke = b.invoke(foo, "get", vec![]);
  let body = ret(&mut b, invoke);
  let main = b.method("main", vec![], vec![body]);
  let ast = b.module("main", vec![class, main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(1))
}

#[test]
fn shared_methods_see_their_class() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // class Counter { shared var count = 0; shared fn bump() { count = count + 1; return count } }
  let zero = b.int(0);
  let count = b.shared_var("count", Some(zero));
  let count_ref = b.id("count");
  let one = b.int(1);
  let sum = b.binary(BinaryOp::Add, count_ref, one);
  let stmt = set(&mut b, "count", sum);
  let count_ref = b.id("count");
  let body = ret(&mut b, count_ref);
  let bump = b.shared_method("bump", vec![], vec![stmt, body]);
  let class = b.class("Counter", vec![count, bump]);

  // fn main() { Counter.bump() return Counter.bump() }
  let counter = b.id("Counter");
  let first = b.invoke(counter, "bump", vec![]);
  let first = b.expr(first);
  let counter = b.id("Counter");
  let second = b.invoke(counter, "bump", vec![]);
  let body = ret(&mut b, second);
  let main = b.method("main", vec![], vec![first, body]);
  let ast = b.module("main", vec![class, main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(2))
}

#[test]
fn for_loop_with_break() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // var n = 0; for item in [1, 2, 3] { if item == 3 { break } n = n + 1 } return n
  let zero = b.int(0);
  let n = b.var("n", Some(zero));
  let elements = vec![b.int(1), b.int(2), b.int(3)];
  let list = b.list(elements);
  let item = b.id("item");
  let three = b.int(3);
  let cond = b.binary(BinaryOp::Equal, item, three);
  let brk = b.break_();
  let then = b.block(vec![brk]);
  let check = b.if_(cond, then, None);
  let n_ref = b.id("n");
  let one = b.int(1);
  let sum = b.binary(BinaryOp::Add, n_ref, one);
  let bump = set(&mut b, "n", sum);
  let body = b.block(vec![check, bump]);
  let for_ = b.for_("item", list, body);
  let n_ref = b.id("n");
  let done = ret(&mut b, n_ref);

  let main = b.method("main", vec![], vec![n, for_, done]);
  let ast = b.module("main", vec![main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(2))
}

#[test]
fn while_loop_counts() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // var n = 0; while n < 5 { n = n + 1 } return n
  let zero = b.int(0);
  let n = b.var("n", Some(zero));
  let n_ref = b.id("n");
  let five = b.int(5);
  let cond = b.binary(BinaryOp::Less, n_ref, five);
  let n_ref = b.id("n");
  let one = b.int(1);
  let sum = b.binary(BinaryOp::Add, n_ref, one);
  let bump = set(&mut b, "n", sum);
  let body = b.block(vec![bump]);
  let while_ = b.while_(cond, body);
  let n_ref = b.id("n");
  let done = ret(&mut b, n_ref);

  let main = b.method("main", vec![], vec![n, while_, done]);
  let ast = b.module("main", vec![main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(5))
}

#[test]
fn closures_share_captured_locals() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // var count = 0; fn bump() { count = count + 1 } bump() bump() bump() return count
  let zero = b.int(0);
  let count = b.var("count", Some(zero));
  let count_ref = b.id("count");
  let one = b.int(1);
  let sum = b.binary(BinaryOp::Add, count_ref, one);
  let stmt = set(&mut b, "count", sum);
  let bump = b.method("bump", vec![], vec![stmt]);
  let calls: Vec<_> = (0..3)
    .map(|_| {
      let call = call(&mut b, "bump", vec![]);
      b.expr(call)
    })
    .collect();
  let count_ref = b.id("count");
  let done = ret(&mut b, count_ref);

  let mut body = vec![count, bump];
  body.extend(calls);
  body.push(done);
  let main = b.method("main", vec![], body);
  let ast = b.module("main", vec![main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(3))
}

#[test]
fn lambdas_capture_parameters() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // fn adder(a) { return |b| a + b }  fn main() { return adder(10)(4) }
  let a = b.param("a");
  let inner = b.param("b");
  let a_ref = b.id("a");
  let b_ref = b.id("b");
  let sum = b.binary(BinaryOp::Add, a_ref, b_ref);
  let lambda = b.lambda(vec![inner], sum);
  let body = ret(&mut b, lambda);
  let adder = b.method("adder", vec![a], vec![body]);

  let ten = b.int(10);
  let add = call(&mut b, "adder", vec![ten]);
  let four = b.int(4);
  let applied = b.call(add, vec![four]);
  let body = ret(&mut b, applied);
  let main = b.method("main", vec![], vec![body]);
  let ast = b.module("main", vec![adder, main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(14))
}

mod errors {
  use super::*;

  #[test]
  fn thrown_values_are_caught() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // try { throw "bad" } catch e { return e }
    let bad = b.string("bad");
    let throw = b.throw(bad);
    let body = b.block(vec![throw]);
    let e = b.id("e");
    let caught = ret(&mut b, e);
    let catch = b.block(vec![caught]);
    let try_ = b.try_catch(body, "e", catch);

    let main = b.method("main", vec![], vec![try_]);
    let ast = b.module("main", vec![main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::from("bad"))
  }

  #[test]
  fn errors_cross_frames_to_handlers() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // fn divide(a) { return a / 0 }
    let a = b.param("a");
    let a_ref = b.id("a");
    let zero = b.int(0);
    let quotient = b.binary(BinaryOp::Divide, a_ref, zero);
    let body = ret(&mut b, quotient);
    let divide = b.method("divide", vec![a], vec![body]);

    // try { divide(1) } catch e { return "caught" }
    let one = b.int(1);
    let call = call(&mut b, "divide", vec![one]);
    let stmt = b.expr(call);
    let body = b.block(vec![stmt]);
    let caught = b.string("caught");
    let caught = ret(&mut b, caught);
    let catch = b.block(vec![caught]);
    let try_ = b.try_catch(body, "e", catch);

    let main = b.method("main", vec![], vec![try_]);
    let ast = b.module("main", vec![divide, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::from("caught"))
  }

  #[test]
  fn uncaught_errors_report_a_trace() -> io::Result<()> {
    let (mut vm, _container) = test_vm();
    let mut b = AstBuilder::new();

    // fn fail() { throw "bad" }
    b.at(2);
    let bad = b.string("bad");
    let throw = b.throw(bad);
    let fail = b.method("fail", vec![], vec![throw]);

    b.at(5);
    let call = call(&mut b, "fail", vec![]);
    let stmt = b.expr(call);
    let main = b.method("main", vec![], vec![stmt]);
    let ast = b.module("main", vec![fail, main]);

    match run_main(&mut vm, ast)? {
      ExecuteResult::RuntimeError(error) => {
        assert_eq!(error.kind, RuntimeErrorKind::Thrown(Value::from("bad")));
        assert_eq!(error.trace.len(), 2);
        assert_eq!(error.trace[0].line, Some(2));
        assert_eq!(error.trace[1].line, Some(5));
      },
      other => panic!("expected a runtime error but got {other:?}"),
    }

    Ok(())
  }

  #[test]
  fn failed_calls_write_to_stderr() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    let bad = b.string("bad");
    let throw = b.throw(bad);
    let main = b.method("main", vec![], vec![throw]);
    let ast = b.module("main", vec![main]);

    let result = run_main(&mut vm, ast)?;
    assert!(matches!(result, ExecuteResult::RuntimeError(_)));

    let stderr = container.stderr.contents();
    assert!(stderr.starts_with("Error: bad"), "stderr was {stderr:?}");
    assert!(stderr.contains("at "));
    Ok(())
  }

  #[test]
  fn wrong_arity_is_an_error() -> io::Result<()> {
    let (mut vm, _container) = test_vm();
    let mut b = AstBuilder::new();

    let a = b.param("a");
    let a_ref = b.id("a");
    let body = ret(&mut b, a_ref);
    let id = b.method("id", vec![a], vec![body]);
    let ast = b.module("main", vec![id]);

    assert_loaded(vm.run(ast))?;
    match vm.call("main", "id", vec![]) {
      ExecuteResult::RuntimeError(error) => match error.kind {
        RuntimeErrorKind::Illegal(message) => assert!(message.contains("expected 1 arguments but got 0")),
        kind => panic!("unexpected error {kind:?}"),
      },
      other => panic!("expected a runtime error but got {other:?}"),
    }
    Ok(())
  }
}

mod classes {
  use super::*;

  #[test]
  fn constructors_initialize_fields() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // class Point { var x; var y; Point(x, y) { self.x = x; self.y = y } fn sum() { return self.x + self.y } }
    let x_field = b.var("x", None);
    let y_field = b.var("y", None);
    let x = b.param("x");
    let y = b.param("y");
    let this = b.self_ref();
    let target = b.member(this, "x");
    let x_ref = b.id("x");
    let assign = b.assign(target, x_ref);
    let set_x = b.expr(assign);
    let this = b.self_ref();
    let target = b.member(this, "y");
    let y_ref = b.id("y");
    let assign = b.assign(target, y_ref);
    let set_y = b.expr(assign);
    let ctor = b.method("Point", vec![x, y], vec![set_x, set_y]);
    let this = b.self_ref();
    let x_get = b.member(this, "x");
    let this = b.self_ref();
    let y_get = b.member(this, "y");
    let sum = b.binary(BinaryOp::Add, x_get, y_get);
    let body = ret(&mut b, sum);
    let sum = b.method("sum", vec![], vec![body]);
    let class = b.class("Point", vec![x_field, y_field, ctor, sum]);

    // fn main() { return Point(1, 2).sum() }
    let one = b.int(1);
    let two = b.int(2);
    let point = call(&mut b, "Point", vec![one, two]);
    let invoke = b.invoke(point, "sum", vec![]);
    let body = ret(&mut b, invoke);
    let main = b.method("main", vec![], vec![body]);
    let ast = b.module("main", vec![class, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::Int(3))
  }

  #[test]
  fn field_initializers_run_before_constructors() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // class Counter { var start = 40; fn get() { return self.start + 2 } }
    let forty = b.int(40);
    let start = b.var("start", Some(forty));
    let this = b.self_ref();
    let field = b.member(this, "start");
    let two = b.int(2);
    let sum = b.binary(BinaryOp::Add, field, two);
    let body = ret(&mut b, sum);
    let get = b.method("get", vec![], vec![body]);
    let class = b.class("Counter", vec![start, get]);

    let counter = call(&mut b, "Counter", vec![]);
    let invoke = b.invoke(counter, "get", vec![]);
    let body = ret(&mut b, invoke);
    let main = b.method("main", vec![], vec![body]);
    let ast = b.module("main", vec![class, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::Int(42))
  }

  #[test]
  fn traits_delegate_missing_members() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // class Greeter { fn greet() { return "hi" } }
    let hi = b.string("hi");
    let body = ret(&mut b, hi);
    let greet = b.method("greet", vec![], vec![body]);
    let greeter = b.class("Greeter", vec![greet]);

    // class Person { final trait greeter = Greeter() }
    let init = call(&mut b, "Greeter", vec![]);
    let delegate = b.declare("greeter", SymbolFlags::FINAL.with(SymbolFlags::TRAIT), Some(init));
    let person = b.class("Person", vec![delegate]);

    // fn main() { return Person().greet() }
    let person_ref = call(&mut b, "Person", vec![]);
    let invoke = b.invoke(person_ref, "greet", vec![]);
    let body = ret(&mut b, invoke);
    let main = b.method("main", vec![], vec![body]);
    let ast = b.module("main", vec![greeter, person, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::from("hi"))
  }

  #[test]
  fn initializer_errors_skip_the_constructor() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // fn fail() { throw "boom" }
    let boom = b.string("boom");
    let throw = b.throw(boom);
    let fail = b.method("fail", vec![], vec![throw]);

    // class Foo { var flag; var boom = fail(); Foo() { try { self.flag = 1 } catch e { self.flag = 2 } } }
    let flag = b.var("flag", None);
    let value = call(&mut b, "fail", vec![]);
    let boom = b.var("boom", Some(value));
    let this = b.self_ref();
    let target = b.member(this, "flag");
    let one = b.int(1);
    let assign = b.assign(target, one);
    let stmt = b.expr(assign);
    let body = b.block(vec![stmt]);
    let this = b.self_ref();
    let target = b.member(this, "flag");
    let two = b.int(2);
    let assign = b.assign(target, two);
    let stmt = b.expr(assign);
    let catch = b.block(vec![stmt]);
    let guarded = b.try_catch(body, "e", catch);
    let ctor = b.method("Foo", vec![], vec![guarded]);
    let class = b.class("Foo", vec![flag, boom, ctor]);

    // fn main() { try { Foo(); return "constructed" } catch e { return e } }
    let foo = call(&mut b, "Foo", vec![]);
    let stmt = b.expr(foo);
    let constructed = b.string("constructed");
    let constructed = ret(&mut b, constructed);
    let body = b.block(vec![stmt, constructed]);
    let e = b.id("e");
    let caught = ret(&mut b, e);
    let catch = b.block(vec![caught]);
    let guarded = b.try_catch(body, "e", catch);
    let main = b.method("main", vec![], vec![guarded]);
    let ast = b.module("main", vec![fail, class, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::from("boom"))
  }

  #[test]
  fn shared_initializer_errors_fail_the_load() -> io::Result<()> {
    let (mut vm, _container) = test_vm();
    let mut b = AstBuilder::new();

    let boom = b.string("boom");
    let throw = b.throw(boom);
    let fail = b.method("fail", vec![], vec![throw]);

    // class Foo { shared var count = fail() }
    let value = call(&mut b, "fail", vec![]);
    let count = b.shared_var("count", Some(value));
    let class = b.class("Foo", vec![count]);
    let ast = b.module("main", vec![fail, class]);

    match vm.run(ast) {
      ExecuteResult::RuntimeError(error) => {
        assert_eq!(error.kind, RuntimeErrorKind::Thrown(Value::from("boom")));
        assert!(error.trace.iter().any(|entry| entry.method.contains("$class_init$")));
      },
      other => panic!("expected a runtime error but got {other:?}"),
    }
    assert!(vm.module("main").is_none());
    Ok(())
  }

  #[test]
  fn bound_methods_keep_their_receiver() -> io::Result<()> {
    let (mut vm, container) = test_vm();
    let mut b = AstBuilder::new();

    // class Box { var value = 7; fn get() { return self.value } }
    let seven = b.int(7);
    let value = b.var("value", Some(seven));
    let this = b.self_ref();
    let field = b.member(this, "value");
    let body = ret(&mut b, field);
    let get = b.method("get", vec![], vec![body]);
    let class = b.class("Box", vec![value, get]);

    // fn main() { var get = Box()::get; return get() }
    let instance = call(&mut b, "Box", vec![]);
    let bound = b.bind("get", instance);
    let local = b.var("getter", Some(bound));
    let called = call(&mut b, "getter", vec![]);
    let body = ret(&mut b, called);
    let main = b.method("main", vec![], vec![local, body]);
    let ast = b.module("main", vec![class, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::Int(7))
  }
}

#[test]
fn default_arguments_fill_missing_slots() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  // fn add(a, c = 4) { return a + c }
  let a = b.param("a");
  let four = b.int(4);
  let c = b.param_default("c", four);
  let a_ref = b.id("a");
  let c_ref = b.id("c");
  let sum = b.binary(BinaryOp::Add, a_ref, c_ref);
  let body = ret(&mut b, sum);
  let add = b.method("add", vec![a, c], vec![body]);

  // fn main() { return add(10) }
  let ten = b.int(10);
  let call = call(&mut b, "add", vec![ten]);
  let body = ret(&mut b, call);
  let main = b.method("main", vec![], vec![body]);
  let ast = b.module("main", vec![add, main]);

  let result = run_main(&mut vm, ast)?;
  assert_returns(&container, result, Value::Int(14))?;
  assert_eq!(
    vm.call("main", "add", vec![Value::Int(1), Value::Int(1)]),
    ExecuteResult::Ok(Value::Int(2))
  );
  Ok(())
}

#[test]
fn print_writes_to_stdout() -> io::Result<()> {
  let (mut vm, container) = test_vm();
  let mut b = AstBuilder::new();

  let import = std_import(&mut b);
  let hello = b.string("hello");
  let one = b.int(1);
  let stmt = print(&mut b, vec![hello, one]);
  let ast = b.module("main", vec![import, stmt]);

  assert_loaded(vm.run(ast))?;
  assert_stdout(&container, &["hello 1"])
}

mod modules {
  use super::*;

  fn math(b: &mut AstBuilder) -> Vec<quill_vm::compiler::ir::ast::NodeId> {
    // final rate = 3; fn scale(a) { return a * rate }
    let three = b.int(3);
    let rate = b.final_var("rate", three);
    let a = b.param("a");
    let a_ref = b.id("a");
    let rate_ref = b.id("rate");
    let product = b.binary(BinaryOp::Multiply, a_ref, rate_ref);
    let body = b.ret(Some(product));
    let scale = b.method("scale", vec![a], vec![body]);
    vec![rate, scale]
  }

  #[test]
  fn imported_symbols() -> io::Result<()> {
    let (mut vm, container) = test_vm();

    let mut b = AstBuilder::new();
    let items = math(&mut b);
    assert_loaded(vm.run(b.module("math", items)))?;

    // import math { scale }  fn main() { return scale(5) }
    let mut b = AstBuilder::new();
    let import = b.import("math", &[("scale", None)]);
    let five = b.int(5);
    let call = call(&mut b, "scale", vec![five]);
    let body = ret(&mut b, call);
    let main = b.method("main", vec![], vec![body]);
    let ast = b.module("main", vec![import, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::Int(15))
  }

  #[test]
  fn imported_modules() -> io::Result<()> {
    let (mut vm, container) = test_vm();

    let mut b = AstBuilder::new();
    let items = math(&mut b);
    assert_loaded(vm.run(b.module("math", items)))?;

    // import math as m  fn main() { return m.rate }
    let mut b = AstBuilder::new();
    let import = b.import_module("math", Some("m"));
    let m = b.id("m");
    let rate = b.member(m, "rate");
    let body = ret(&mut b, rate);
    let main = b.method("main", vec![], vec![body]);
    let ast = b.module("main", vec![import, main]);

    let result = run_main(&mut vm, ast)?;
    assert_returns(&container, result, Value::Int(3))
  }

  #[test]
  fn unknown_imports_do_not_compile() {
    let (mut vm, container) = test_vm();

    let mut b = AstBuilder::new();
    let import = b.import("missing", &[("thing", None)]);
    let ast = b.module("main", vec![import]);

    assert_eq!(vm.run(ast), ExecuteResult::CompileError);
    assert!(!container.stderr.contents().is_empty());
    assert!(vm.module("main").is_none());
  }
}
