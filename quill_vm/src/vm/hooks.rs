use super::Vm;
use crate::{
  fiber::{Continuation, Step, StepResult, Unwind},
  value::Value,
};
use log::debug;

impl Vm {
  /// Call `callee` to completion on the current fiber. Natives use this
  /// to call back into scripts
  pub fn call_value(&mut self, callee: &Value, args: &[Value]) -> StepResult {
    let bottom = self.fiber.frame_count();

    match self.push_call(callee.clone(), args.to_vec())? {
      Some(value) => Ok(value),
      None => self.execute(bottom),
    }
  }

  /// Run `steps` in order, each fed the result of the previous one.
  /// When a step suspends the steps after it are kept so a resume
  /// runs each of them exactly once
  pub fn run_steps(&mut self, steps: &[Step], input: Value) -> StepResult {
    let mut value = input;

    for (index, step) in steps.iter().enumerate() {
      value = match (**step)(self, value) {
        Ok(value) => value,
        Err(Unwind::Suspend) => {
          let rest = &steps[index + 1..];
          if !rest.is_empty() {
            self.fiber.push_suspension(Continuation::Steps {
              partial: Value::Null,
              steps: rest.to_vec(),
            });
          }
          return Err(Unwind::Suspend);
        },
        Err(error) => return Err(error),
      };
    }

    Ok(value)
  }

  /// Suspend the current fiber waiting on `cause`. The returned value
  /// must be propagated by the caller. On resume `steps` run with the
  /// resumed value, `partial` when resumed without one
  pub fn suspend(&mut self, cause: Value, partial: Value, steps: Vec<Step>) -> Unwind {
    debug!("suspending on {cause} with {} steps", steps.len());
    self.fiber.set_cause(cause);
    self
      .fiber
      .push_suspension(Continuation::Steps { partial, steps });
    Unwind::Suspend
  }
}
