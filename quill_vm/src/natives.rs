use crate::{
  env::NativeModule,
  fiber::StepResult,
  value::Value,
  vm::{RuntimeError, Vm},
};
use std::io::Write;

/// The name of the standard native module
pub const STD: &str = "std";

/// print, range, len and str
pub fn std_module() -> NativeModule {
  NativeModule::new(STD)
    .with_function("print", None, print)
    .with_function("range", None, range)
    .with_function("len", Some(1), len)
    .with_function("str", Some(1), stringify)
}

fn print(vm: &mut Vm, args: &[Value]) -> StepResult {
  let line = args
    .iter()
    .map(|arg| arg.to_string())
    .collect::<Vec<String>>()
    .join(" ");

  let mut stdio = vm.io().stdio();
  writeln!(stdio.stdout(), "{line}")
    .map_err(|error| RuntimeError::illegal(format!("Unable to print: {error}")))?;
  Ok(Value::Null)
}

/// `range(end)` or `range(start, end)` as a list of ints
fn range(_vm: &mut Vm, args: &[Value]) -> StepResult {
  let bounds: Option<Vec<i64>> = args.iter().map(Value::as_int).collect();

  let (start, end) = match bounds.as_deref() {
    Some([end]) => (0, *end),
    Some([start, end]) => (*start, *end),
    _ => {
      return Err(RuntimeError::illegal("range expects one or two ints.").into());
    },
  };

  Ok(Value::list((start..end).map(Value::Int).collect()))
}

fn len(_vm: &mut Vm, args: &[Value]) -> StepResult {
  match &args[0] {
    Value::List(list) => Ok(Value::Int(list.borrow().len() as i64)),
    Value::Str(string) => Ok(Value::Int(string.chars().count() as i64)),
    other => Err(RuntimeError::illegal(format!("'{}' has no length.", other.type_name())).into()),
  }
}

fn stringify(_vm: &mut Vm, args: &[Value]) -> StepResult {
  Ok(Value::from(args[0].to_string()))
}
