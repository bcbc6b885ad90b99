use super::{
  BinaryError, BinaryResult, ReaderConfig, MAGIC, TAG_BOOL, TAG_BYTE, TAG_CLASS, TAG_DOUBLE,
  TAG_FLOAT, TAG_INT, TAG_LONG, TAG_METHOD, TAG_NULL, TAG_SHORT, TAG_STRING, VERSION,
};
use crate::chunk::{
  CClass, CMethod, CModule, Constant, ConstantPool, DebugEntry, ExceptionEntry, Import,
  Namespace, NamespaceEntry, NamespaceFlags,
};
use log::debug;
use std::{
  io::{self, Read},
  sync::Arc,
};

/// Read a module in the binary module format from `input`
pub fn read_module<R: Read>(input: &mut R, config: ReaderConfig) -> BinaryResult<CModule> {
  let mut reader = BinaryReader {
    input,
    config,
    depth: 0,
  };

  let magic = reader.u32()?;
  if magic != MAGIC {
    return Err(BinaryError::BadMagic(magic));
  }

  let version = reader.u16()?;
  if version > VERSION {
    return Err(BinaryError::UnsupportedVersion(version));
  }

  let name = reader.string()?;

  let constant_count = reader.length()?;
  let mut constants = Vec::new();
  for _ in 0..constant_count {
    constants.push(reader.constant()?);
  }

  let import_count = reader.length()?;
  let mut imports = Vec::new();
  for _ in 0..import_count {
    imports.push(reader.import()?);
  }

  let namespace = reader.namespace()?;

  debug!(
    "read module {} with {} constants and {} namespace entries",
    name,
    constants.len(),
    namespace.len()
  );

  Ok(CModule {
    name,
    constants: ConstantPool::from_values(constants),
    imports,
    namespace,
  })
}

struct BinaryReader<'a, R: Read> {
  input: &'a mut R,
  config: ReaderConfig,
  depth: usize,
}

impl<'a, R: Read> BinaryReader<'a, R> {
  fn bytes<const N: usize>(&mut self) -> BinaryResult<[u8; N]> {
    let mut buffer = [0u8; N];
    self.input.read_exact(&mut buffer)?;
    Ok(buffer)
  }

  fn u8(&mut self) -> BinaryResult<u8> {
    Ok(self.bytes::<1>()?[0])
  }

  fn u16(&mut self) -> BinaryResult<u16> {
    Ok(u16::from_be_bytes(self.bytes()?))
  }

  fn u32(&mut self) -> BinaryResult<u32> {
    Ok(u32::from_be_bytes(self.bytes()?))
  }

  fn i32(&mut self) -> BinaryResult<i32> {
    Ok(i32::from_be_bytes(self.bytes()?))
  }

  /// A count or length field checked against the configured maximum
  fn length(&mut self) -> BinaryResult<usize> {
    let length = self.i32()?;
    if length < 0 {
      return Err(BinaryError::NegativeLength(length));
    }

    let size = length as usize;
    if size > self.config.max_buffer_size {
      return Err(BinaryError::BufferTooLarge {
        size,
        max: self.config.max_buffer_size,
      });
    }

    Ok(size)
  }

  /// An index field such as a code offset or slot
  fn index(&mut self) -> BinaryResult<u32> {
    let value = self.i32()?;
    u32::try_from(value).map_err(|_| BinaryError::NegativeLength(value))
  }

  fn buffer(&mut self) -> BinaryResult<Vec<u8>> {
    let length = self.length()?;
    let mut buffer = Vec::new();

    (&mut *self.input)
      .take(length as u64)
      .read_to_end(&mut buffer)?;

    if buffer.len() != length {
      return Err(BinaryError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
    }
    Ok(buffer)
  }

  fn string(&mut self) -> BinaryResult<String> {
    String::from_utf8(self.buffer()?).map_err(|_| BinaryError::InvalidUtf8)
  }

  fn strings(&mut self) -> BinaryResult<Vec<String>> {
    let count = self.length()?;
    let mut strings = Vec::new();
    for _ in 0..count {
      strings.push(self.string()?);
    }
    Ok(strings)
  }

  fn constant(&mut self) -> BinaryResult<Constant> {
    let tag = self.u8()?;

    Ok(match tag {
      TAG_NULL => Constant::Null,
      TAG_BYTE => Constant::Byte(i8::from_be_bytes(self.bytes()?)),
      TAG_BOOL => Constant::Bool(self.u8()? != 0),
      TAG_SHORT => Constant::Short(i16::from_be_bytes(self.bytes()?)),
      TAG_INT => Constant::Int(self.i32()?),
      TAG_LONG => Constant::Long(i64::from_be_bytes(self.bytes()?)),
      TAG_FLOAT => Constant::Float(f32::from_be_bytes(self.bytes()?)),
      TAG_DOUBLE => Constant::Double(f64::from_be_bytes(self.bytes()?)),
      TAG_STRING => Constant::Str(self.string()?),
      TAG_METHOD => {
        self.enter()?;
        let method = self.method()?;
        self.depth -= 1;
        Constant::Method(Arc::new(method))
      },
      TAG_CLASS => {
        self.enter()?;
        let class = self.class()?;
        self.depth -= 1;
        Constant::Class(Arc::new(class))
      },
      _ => return Err(BinaryError::UnknownTag(tag)),
    })
  }

  fn enter(&mut self) -> BinaryResult<()> {
    self.depth += 1;
    if self.depth > self.config.max_depth {
      return Err(BinaryError::TooDeep(self.config.max_depth));
    }
    Ok(())
  }

  fn import(&mut self) -> BinaryResult<Import> {
    let module = self.string()?;
    let all = self.u8()? != 0;
    let symbols = self.strings()?;
    let aliases = self.strings()?;

    if aliases.len() != symbols.len() && !(symbols.is_empty() && aliases.len() == 1) {
      return Err(BinaryError::Malformed("import aliases do not match its symbols"));
    }

    Ok(Import {
      module,
      all,
      symbols,
      aliases,
    })
  }

  fn namespace(&mut self) -> BinaryResult<Namespace> {
    let count = self.length()?;
    let mut entries = Vec::new();

    for _ in 0..count {
      let name = self.string()?;
      let bits = self.u8()?;
      let flags = NamespaceFlags::from_bits(bits).ok_or(BinaryError::InvalidFlags(bits))?;
      let value = self.constant()?;

      entries.push(NamespaceEntry { name, flags, value });
    }

    Ok(Namespace::new(entries))
  }

  fn method(&mut self) -> BinaryResult<CMethod> {
    let name = self.string()?;
    let locals = self.index()?;
    if locals as usize > self.config.max_locals {
      return Err(BinaryError::BufferTooLarge {
        size: locals as usize,
        max: self.config.max_locals,
      });
    }
    let args = self.index()?;
    let default_args = self.index()?;

    if default_args > args || args > locals {
      return Err(BinaryError::Malformed("method arity exceeds its locals"));
    }

    let code = self.buffer()?;

    let exception_count = self.length()?;
    let mut exceptions = Vec::new();
    for _ in 0..exception_count {
      let entry = ExceptionEntry {
        start: self.index()?,
        catch: self.index()?,
        end: self.index()?,
        local: self.index()?,
      };
      if entry.local >= locals {
        return Err(BinaryError::Malformed("exception local is outside the frame"));
      }
      exceptions.push(entry);
    }

    let debug_count = self.length()?;
    let mut debug = Vec::new();
    for _ in 0..debug_count {
      debug.push(DebugEntry {
        begin: self.index()?,
        end: self.index()?,
        line: self.index()?,
      });
    }

    Ok(CMethod {
      name,
      locals,
      args,
      default_args,
      code,
      exceptions,
      debug,
    })
  }

  fn class(&mut self) -> BinaryResult<CClass> {
    let name = self.string()?;
    let shared_init = self.method()?;
    let shared = self.namespace()?;
    let instance_init = self.method()?;
    let instance = self.namespace()?;

    Ok(CClass {
      name,
      shared_init,
      shared,
      instance_init,
      instance,
    })
  }
}
