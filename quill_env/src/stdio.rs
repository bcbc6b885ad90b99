use crate::io::IoImpl;
use std::io::{self, Write};

/// A wrapper around the output streams a script may write to
pub struct Stdio {
  stdio: Box<dyn StdioImpl>,
}

impl Default for Stdio {
  fn default() -> Self {
    Self {
      stdio: Box::<StdioMock>::default(),
    }
  }
}

impl Stdio {
  /// Create a new wrapper from the provided stdio facilities
  pub fn new(stdio: Box<dyn StdioImpl>) -> Self {
    Self { stdio }
  }

  /// Get a Write to stdout
  pub fn stdout(&mut self) -> &mut dyn Write {
    self.stdio.stdout()
  }

  /// Get a Write to stderr
  pub fn stderr(&mut self) -> &mut dyn Write {
    self.stdio.stderr()
  }
}

pub trait StdioImpl {
  fn stdout(&mut self) -> &mut dyn Write;
  fn stderr(&mut self) -> &mut dyn Write;
}

#[derive(Debug)]
pub struct IoStdioMock();

impl IoImpl<Stdio> for IoStdioMock {
  fn make(&self) -> Stdio {
    Stdio::default()
  }
}

/// Discards everything written to it
#[derive(Default)]
pub struct StdioMock {
  write: MockWrite,
}

impl StdioImpl for StdioMock {
  fn stdout(&mut self) -> &mut dyn Write {
    &mut self.write
  }
  fn stderr(&mut self) -> &mut dyn Write {
    &mut self.write
  }
}

#[derive(Default)]
pub struct MockWrite();

impl Write for MockWrite {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    Ok(buf.len())
  }
  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

pub mod support {
  use super::{Stdio, StdioImpl};
  use crate::io::IoImpl;
  use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
  };

  /// A shared in memory sink that a test can inspect after
  /// the vm has written to it
  #[derive(Debug, Default, Clone)]
  pub struct TestWriter(Rc<RefCell<Vec<u8>>>);

  impl TestWriter {
    /// The bytes written so far as a string
    pub fn contents(&self) -> String {
      String::from_utf8_lossy(&self.0.borrow()).to_string()
    }

    /// The lines written so far
    pub fn lines(&self) -> Vec<String> {
      self
        .contents()
        .trim_end()
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
    }
  }

  impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.borrow_mut().extend_from_slice(buf);
      Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[derive(Debug, Default)]
  pub struct StdioTestContainer {
    pub stdout: TestWriter,
    pub stderr: TestWriter,
  }

  impl StdioTestContainer {
    pub fn make_stdio(&self) -> StdioTest {
      StdioTest {
        stdout: self.stdout.clone(),
        stderr: self.stderr.clone(),
      }
    }

    pub fn log_stdio(&self) {
      eprintln!("{}", self.stdout.contents());
      eprintln!("{}", self.stderr.contents());
    }
  }

  #[derive(Debug)]
  pub struct IoStdioTest {
    container: Rc<StdioTestContainer>,
  }

  impl IoStdioTest {
    pub fn new(container: &Rc<StdioTestContainer>) -> Self {
      Self {
        container: Rc::clone(container),
      }
    }
  }

  impl IoImpl<Stdio> for IoStdioTest {
    fn make(&self) -> Stdio {
      Stdio::new(Box::new(self.container.make_stdio()))
    }
  }

  #[derive(Debug)]
  pub struct StdioTest {
    stdout: TestWriter,
    stderr: TestWriter,
  }

  impl StdioImpl for StdioTest {
    fn stdout(&mut self) -> &mut dyn Write {
      &mut self.stdout
    }
    fn stderr(&mut self) -> &mut dyn Write {
      &mut self.stderr
    }
  }
}
