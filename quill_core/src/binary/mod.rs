//! The binary module format. Every multi byte value is big endian,
//! counts and lengths are signed 32 bit integers.

mod reader;
mod writer;

pub use reader::read_module;
pub use writer::write_module;

use std::{error::Error, fmt, io};

/// Identifies a quill binary module, "QUIL"
pub const MAGIC: u32 = 0x5155_494C;

/// The newest format version this build reads and writes
pub const VERSION: u16 = 1;

/// The default limit on any length or count field
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// The default limit on the local slots a single method may declare
pub const DEFAULT_MAX_LOCALS: usize = 64 * 1024;

/// The default limit on class and method nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

pub(crate) const TAG_NULL: u8 = 0;
pub(crate) const TAG_BYTE: u8 = 1;
pub(crate) const TAG_BOOL: u8 = 2;
pub(crate) const TAG_SHORT: u8 = 3;
pub(crate) const TAG_INT: u8 = 4;
pub(crate) const TAG_LONG: u8 = 5;
pub(crate) const TAG_FLOAT: u8 = 6;
pub(crate) const TAG_DOUBLE: u8 = 7;
pub(crate) const TAG_STRING: u8 = 8;
pub(crate) const TAG_METHOD: u8 = 9;
pub(crate) const TAG_CLASS: u8 = 10;

/// Limits applied while reading a binary module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
  /// The largest length or count a module may declare
  pub max_buffer_size: usize,

  /// The deepest nesting of classes and methods
  pub max_depth: usize,

  /// The most local slots a method may declare
  pub max_locals: usize,
}

impl Default for ReaderConfig {
  fn default() -> Self {
    Self {
      max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
      max_depth: DEFAULT_MAX_DEPTH,
      max_locals: DEFAULT_MAX_LOCALS,
    }
  }
}

impl ReaderConfig {
  pub fn with_max_buffer_size(self, max_buffer_size: usize) -> Self {
    Self {
      max_buffer_size,
      ..self
    }
  }

  pub fn with_max_locals(self, max_locals: usize) -> Self {
    Self { max_locals, ..self }
  }
}

#[derive(Debug)]
pub enum BinaryError {
  /// The underlying stream failed or ended early
  Io(io::Error),

  /// The stream does not start with the module magic
  BadMagic(u32),

  /// The module was written by a newer format version
  UnsupportedVersion(u16),

  /// A length or count was negative
  NegativeLength(i32),

  /// A length or count exceeded the configured maximum
  BufferTooLarge { size: usize, max: usize },

  /// A value had an unknown tag byte
  UnknownTag(u8),

  /// A namespace entry carried unknown flag bits
  InvalidFlags(u8),

  /// A string was not valid utf8
  InvalidUtf8,

  /// Classes and methods were nested too deeply
  TooDeep(usize),

  /// A value too large for the format was written
  ValueTooLarge(usize),

  /// The module was structurally inconsistent
  Malformed(&'static str),
}

impl fmt::Display for BinaryError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BinaryError::Io(err) => write!(f, "Io error: {err}"),
      BinaryError::BadMagic(magic) => write!(f, "Not a quill module, magic was {magic:#010x}."),
      BinaryError::UnsupportedVersion(version) => write!(
        f,
        "Module version {version} is newer than supported version {VERSION}."
      ),
      BinaryError::NegativeLength(length) => write!(f, "Negative length {length}."),
      BinaryError::BufferTooLarge { size, max } => {
        write!(f, "Declared size {size} exceeds the maximum of {max}.")
      },
      BinaryError::UnknownTag(tag) => write!(f, "Unknown value tag {tag}."),
      BinaryError::InvalidFlags(flags) => write!(f, "Invalid namespace flags {flags:#04x}."),
      BinaryError::InvalidUtf8 => write!(f, "String was not valid utf8."),
      BinaryError::TooDeep(depth) => write!(f, "Nesting exceeds depth {depth}."),
      BinaryError::ValueTooLarge(size) => write!(f, "Value of size {size} cannot be encoded."),
      BinaryError::Malformed(message) => write!(f, "Malformed module: {message}."),
    }
  }
}

impl Error for BinaryError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      BinaryError::Io(err) => Some(err),
      _ => None,
    }
  }
}

impl From<io::Error> for BinaryError {
  fn from(err: io::Error) -> Self {
    BinaryError::Io(err)
  }
}

pub type BinaryResult<T> = Result<T, BinaryError>;
