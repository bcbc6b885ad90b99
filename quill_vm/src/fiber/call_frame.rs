use crate::object::Closure;
use std::rc::Rc;

/// What happens to the value a frame returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
  /// The value is handed to the caller
  Normal,

  /// The value is dropped, used by initializers
  Discard,

  /// The receiver is handed to the caller, used by constructors
  Construct,

  /// The value is dropped and the class is marked initialized, used by
  /// shared initializers
  ClassInit,
}

/// A single activation of a method
#[derive(Clone)]
pub struct CallFrame {
  pub closure: Rc<Closure>,

  /// The next instruction to execute
  pub ip: usize,

  /// The instruction currently executing, used to find handlers and lines
  pub last_ip: usize,

  /// Has any instruction of this frame executed
  pub started: bool,

  /// Height of the operand stack when this frame was entered
  pub stack_base: usize,

  /// Number of arguments actually passed
  pub arg_count: usize,

  pub kind: FrameKind,
}

impl CallFrame {
  pub fn new(closure: Rc<Closure>, stack_base: usize, arg_count: usize, kind: FrameKind) -> Self {
    Self {
      closure,
      ip: 0,
      last_ip: 0,
      started: false,
      stack_base,
      arg_count,
      kind,
    }
  }
}
