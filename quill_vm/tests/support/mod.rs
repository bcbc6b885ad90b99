#![allow(dead_code)]

use quill_env::{
  io::Io,
  stdio::support::{IoStdioTest, StdioTestContainer},
};
use quill_vm::{
  compiler::ir::ast::{Ast, AstBuilder, NodeId},
  env::{Environment, NativeModule},
  value::Value,
  vm::{ExecuteResult, Vm},
};
use std::{
  io::{self, ErrorKind},
  rc::Rc,
};

/// Install the test logger once per binary
pub fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// A vm with the standard natives whose stdio is captured
pub fn test_vm() -> (Vm, Rc<StdioTestContainer>) {
  test_vm_with(|env| env)
}

/// A vm whose environment is customized by `configure`
pub fn test_vm_with(configure: impl FnOnce(Environment) -> Environment) -> (Vm, Rc<StdioTestContainer>) {
  init_logging();

  let container = Rc::new(StdioTestContainer::default());
  let io = Io::new(Rc::new(IoStdioTest::new(&container)));
  let env = configure(Environment::standard(io));
  (Vm::new(env), container)
}

/// `import std { print, range, len }`
pub fn std_import(b: &mut AstBuilder) -> NodeId {
  b.import("std", &[("print", None), ("range", None), ("len", None)])
}

/// `print(args...)` as a statement
pub fn print(b: &mut AstBuilder, args: Vec<NodeId>) -> NodeId {
  let print = b.id("print");
  let call = b.call(print, args);
  b.expr(call)
}

/// `name = value` as a statement
pub fn set(b: &mut AstBuilder, name: &str, value: NodeId) -> NodeId {
  let target = b.id(name);
  let assign = b.assign(target, value);
  b.expr(assign)
}

/// `return value`
pub fn ret(b: &mut AstBuilder, value: NodeId) -> NodeId {
  b.ret(Some(value))
}

/// `name(args...)`
pub fn call(b: &mut AstBuilder, name: &str, args: Vec<NodeId>) -> NodeId {
  let callee = b.id(name);
  b.call(callee, args)
}

/// Compile and load `ast` then call its module level `main`
pub fn run_main(vm: &mut Vm, ast: Ast) -> io::Result<ExecuteResult> {
  let module = ast.name().to_string();
  assert_loaded(vm.run(ast))?;
  Ok(vm.call(&module, "main", vec![]))
}

fn failure(message: String) -> io::Error {
  io::Error::new(ErrorKind::Other, message)
}

pub fn assert_loaded(result: ExecuteResult) -> io::Result<()> {
  match result {
    ExecuteResult::Ok(Value::Module(_)) => Ok(()),
    other => Err(failure(format!("module failed to load: {other:?}"))),
  }
}

/// Check `result` printing the captured stdio when it differs
pub fn assert_result(
  container: &StdioTestContainer,
  result: ExecuteResult,
  expected: ExecuteResult,
) -> io::Result<()> {
  if result == expected {
    Ok(())
  } else {
    container.log_stdio();
    Err(failure(format!("expected {expected:?} but got {result:?}")))
  }
}

pub fn assert_returns(container: &StdioTestContainer, result: ExecuteResult, expected: Value) -> io::Result<()> {
  assert_result(container, result, ExecuteResult::Ok(expected))
}

pub fn assert_stdout(container: &StdioTestContainer, expected: &[&str]) -> io::Result<()> {
  let lines = container.stdout.lines();
  if lines == expected {
    Ok(())
  } else {
    container.log_stdio();
    Err(failure(format!("expected stdout {expected:?} but got {lines:?}")))
  }
}

/// A native module whose single function returns its first argument
pub fn identity_module(name: &str) -> NativeModule {
  NativeModule::new(name).with_function("identity", Some(1), |_, args| Ok(args[0].clone()))
}
