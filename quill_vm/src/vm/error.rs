use super::Vm;
use crate::{fiber::FrameKind, value::Value};
use log::debug;
use std::fmt;

/// What went wrong while executing
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
  /// A value thrown by a script or a native
  Thrown(Value),

  /// An operation the runtime cannot perform
  Illegal(String),

  /// Cooperative cancellation requested through an interrupt handle
  Interrupted,
}

/// One method the error passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
  pub method: String,
  pub line: Option<u32>,
}

/// An error raised while executing, with the methods it unwound
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
  pub kind: RuntimeErrorKind,

  /// The unwound methods from the innermost outward
  pub trace: Vec<TraceEntry>,
}

impl RuntimeError {
  pub fn new(kind: RuntimeErrorKind) -> Self {
    Self { kind, trace: vec![] }
  }

  pub fn thrown(value: Value) -> Self {
    Self::new(RuntimeErrorKind::Thrown(value))
  }

  pub fn illegal(message: impl Into<String>) -> Self {
    Self::new(RuntimeErrorKind::Illegal(message.into()))
  }

  pub fn interrupted() -> Self {
    Self::new(RuntimeErrorKind::Interrupted)
  }

  pub fn is_interrupt(&self) -> bool {
    matches!(self.kind, RuntimeErrorKind::Interrupted)
  }

  /// The value a catch block receives
  pub fn value(&self) -> Value {
    match &self.kind {
      RuntimeErrorKind::Thrown(value) => value.clone(),
      RuntimeErrorKind::Illegal(message) => Value::from(message.as_str()),
      RuntimeErrorKind::Interrupted => Value::Null,
    }
  }

  pub fn push_trace(&mut self, method: impl Into<String>, line: Option<u32>) {
    self.trace.push(TraceEntry {
      method: method.into(),
      line,
    });
  }
}

impl fmt::Display for RuntimeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      RuntimeErrorKind::Thrown(value) => write!(f, "Error: {value}")?,
      RuntimeErrorKind::Illegal(message) => write!(f, "Error: {message}")?,
      RuntimeErrorKind::Interrupted => write!(f, "Execution was interrupted.")?,
    }

    for entry in &self.trace {
      match entry.line {
        Some(line) => write!(f, "\n  at {} (line {})", entry.method, line)?,
        None => write!(f, "\n  at {}", entry.method)?,
      }
    }

    Ok(())
  }
}

impl Vm {
  /// Report an internal issue to the user
  pub(super) fn internal_error(&self, message: &str) -> ! {
    panic!("Internal Error: {message}")
  }

  /// Search for a handler from the innermost frame down to `bottom`.
  /// When one is found execution continues at its catch block,
  /// otherwise every frame above `bottom` is discarded. Frames that
  /// have not executed yet, such as a constructor waiting on its
  /// initializer, never handle the error
  pub(super) fn unwind(&mut self, bottom: usize, mut error: RuntimeError) -> Result<(), RuntimeError> {
    while self.fiber.frame_count() > bottom {
      let (closure, last_ip, started, kind) = match self.fiber.frame() {
        Some(frame) => (frame.closure.clone(), frame.last_ip, frame.started, frame.kind),
        None => break,
      };
      let method = closure.method();

      if started && !error.is_interrupt() {
        if let Some(handler) = method.handler_at(last_ip) {
          debug!("caught error in {} at {}", method.name, handler.catch);
          self
            .fiber
            .catch(handler.catch as usize, handler.local as usize, error.value());
          return Ok(());
        }
      }

      let line = if started { method.line_at(last_ip) } else { None };
      error.push_trace(method.name.clone(), line);

      if kind == FrameKind::ClassInit {
        if let Some(class) = closure.class() {
          class.abort_init();
        }
      }
      self.fiber.pop_frame();
    }

    Err(error)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn display_includes_trace() {
    let mut error = RuntimeError::thrown(Value::from("boom"));
    error.push_trace("inner", Some(3));
    error.push_trace("$module_init$", None);

    assert_eq!(
      error.to_string(),
      "Error: boom\n  at inner (line 3)\n  at $module_init$"
    );
  }

  #[test]
  fn caught_values() {
    assert_eq!(RuntimeError::thrown(Value::Int(1)).value(), Value::Int(1));
    assert_eq!(
      RuntimeError::illegal("bad").value(),
      Value::from("bad")
    );
    assert!(RuntimeError::interrupted().is_interrupt());
    assert_eq!(
      RuntimeError::interrupted().to_string(),
      "Execution was interrupted."
    );
  }
}
