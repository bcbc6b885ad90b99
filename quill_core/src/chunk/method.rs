/// A region of a method protected by a catch block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
  /// First byte of the protected region
  pub start: u32,

  /// Entry point of the catch block
  pub catch: u32,

  /// One past the last byte of the protected region
  pub end: u32,

  /// Local slot the caught error is bound to
  pub local: u32,
}

impl ExceptionEntry {
  /// Does this entry protect the instruction at `offset`
  pub fn covers(&self, offset: usize) -> bool {
    (self.start as usize) <= offset && offset < (self.end as usize)
  }
}

/// A range of code produced from a single source line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEntry {
  pub begin: u32,
  pub end: u32,
  pub line: u32,
}

/// A compiled method
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CMethod {
  /// Debug symbol of this method
  pub name: String,

  /// Number of local slots including parameters
  pub locals: u32,

  /// Number of declared parameters
  pub args: u32,

  /// How many of the trailing parameters have a default
  pub default_args: u32,

  /// The encoded instructions
  pub code: Vec<u8>,

  /// Catch regions, innermost regions first
  pub exceptions: Vec<ExceptionEntry>,

  /// Line table of this method
  pub debug: Vec<DebugEntry>,
}

impl CMethod {
  /// The fewest arguments this method can be called with
  pub fn min_args(&self) -> u32 {
    self.args.saturating_sub(self.default_args)
  }

  /// Can this method be called with `count` arguments
  pub fn accepts(&self, count: usize) -> bool {
    (self.min_args() as usize) <= count && count <= self.args as usize
  }

  /// Find the source line of the instruction at `offset`
  pub fn line_at(&self, offset: usize) -> Option<u32> {
    self
      .debug
      .iter()
      .find(|entry| (entry.begin as usize) <= offset && offset < (entry.end as usize))
      .map(|entry| entry.line)
  }

  /// The first catch region protecting `offset`
  pub fn handler_at(&self, offset: usize) -> Option<&ExceptionEntry> {
    self.exceptions.iter().find(|entry| entry.covers(offset))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn method() -> CMethod {
    CMethod {
      name: "example".to_string(),
      locals: 3,
      args: 2,
      default_args: 1,
      code: vec![0; 20],
      exceptions: vec![
        ExceptionEntry {
          start: 4,
          catch: 10,
          end: 8,
          local: 2,
        },
        ExceptionEntry {
          start: 2,
          catch: 14,
          end: 10,
          local: 2,
        },
      ],
      debug: vec![
        DebugEntry {
          begin: 0,
          end: 6,
          line: 1,
        },
        DebugEntry {
          begin: 6,
          end: 20,
          line: 2,
        },
      ],
    }
  }

  #[test]
  fn accepts() {
    let method = method();
    assert!(!method.accepts(0));
    assert!(method.accepts(1));
    assert!(method.accepts(2));
    assert!(!method.accepts(3));
  }

  #[test]
  fn line_at() {
    let method = method();
    assert_eq!(method.line_at(0), Some(1));
    assert_eq!(method.line_at(6), Some(2));
    assert_eq!(method.line_at(20), None);
  }

  #[test]
  fn handler_at_prefers_inner() {
    let method = method();
    assert_eq!(method.handler_at(5).map(|e| e.catch), Some(10));
    assert_eq!(method.handler_at(9).map(|e| e.catch), Some(14));
    assert!(method.handler_at(1).is_none());
  }
}
