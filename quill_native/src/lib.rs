#![deny(clippy::all)]

use quill_env::{
  io::{Io, IoImpl},
  stdio::{Stdio, StdioImpl},
};
use std::{io, rc::Rc};

/// An io wrapper backed by the host process
pub fn io_native() -> Io {
  Io::new(Rc::new(ProcessIo))
}

/// Hands out stdio bound to the process streams
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessIo;

impl IoImpl<Stdio> for ProcessIo {
  fn make(&self) -> Stdio {
    Stdio::new(Box::new(ProcessStdio {
      stdout: io::stdout(),
      stderr: io::stderr(),
    }))
  }
}

struct ProcessStdio {
  stdout: io::Stdout,
  stderr: io::Stderr,
}

impl StdioImpl for ProcessStdio {
  fn stdout(&mut self) -> &mut dyn io::Write {
    &mut self.stdout
  }

  fn stderr(&mut self) -> &mut dyn io::Write {
    &mut self.stderr
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::io::Write;

  #[test]
  fn process_stdio_accepts_writes() {
    let mut stdio = io_native().stdio();
    assert!(write!(stdio.stderr(), "").is_ok());
    assert!(stdio.stdout().flush().is_ok());
  }
}
