use super::call_frame::CallFrame;
use crate::{
  value::Value,
  vm::{RuntimeError, Vm},
};
use std::rc::Rc;

/// Why execution stopped before producing a value
#[derive(Debug, PartialEq)]
pub enum Unwind {
  /// Work was captured as continuations on the fiber
  Suspend,

  /// An error is propagating
  Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
  fn from(error: RuntimeError) -> Self {
    Unwind::Error(error)
  }
}

/// The result of a native function or a step
pub type StepResult = Result<Value, Unwind>;

/// A unit of resumable native work fed the result of the previous step
pub type Step = Rc<dyn Fn(&mut Vm, Value) -> StepResult>;

/// The frames of one interpreter activation, with operand stack and
/// frame pointers relative to the activation's base
#[derive(Clone)]
pub struct FrameSnapshot {
  pub frames: Vec<CallFrame>,
  pub stack: Vec<Value>,
  pub locals: Vec<Value>,
  pub frame_pointers: Vec<usize>,
}

/// Work remaining when a fiber suspended
#[derive(Clone)]
pub enum Continuation {
  /// Interpreter frames waiting on the result of a call
  Frames(FrameSnapshot),

  /// Native steps not yet run
  Steps { partial: Value, steps: Vec<Step> },
}

impl Continuation {
  /// The value fed to this continuation when resumed without one
  pub fn partial(&self) -> Value {
    match self {
      Continuation::Frames(_) => Value::Null,
      Continuation::Steps { partial, .. } => partial.clone(),
    }
  }
}
