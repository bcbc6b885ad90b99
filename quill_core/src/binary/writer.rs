use super::{
  BinaryError, BinaryResult, MAGIC, TAG_BOOL, TAG_BYTE, TAG_CLASS, TAG_DOUBLE, TAG_FLOAT,
  TAG_INT, TAG_LONG, TAG_METHOD, TAG_NULL, TAG_SHORT, TAG_STRING, VERSION,
};
use crate::chunk::{CClass, CMethod, CModule, Constant, Import, Namespace};
use std::io::Write;

/// Write `module` to `out` in the binary module format
pub fn write_module<W: Write>(module: &CModule, out: &mut W) -> BinaryResult<()> {
  let mut writer = BinaryWriter { out };

  writer.u32(MAGIC)?;
  writer.u16(VERSION)?;
  writer.string(&module.name)?;

  writer.length(module.constants.len())?;
  for constant in module.constants.iter() {
    writer.constant(constant)?;
  }

  writer.length(module.imports.len())?;
  for import in &module.imports {
    writer.import(import)?;
  }

  writer.namespace(&module.namespace)?;
  writer.out.flush()?;
  Ok(())
}

struct BinaryWriter<'a, W: Write> {
  out: &'a mut W,
}

impl<'a, W: Write> BinaryWriter<'a, W> {
  fn u8(&mut self, value: u8) -> BinaryResult<()> {
    Ok(self.out.write_all(&[value])?)
  }

  fn u16(&mut self, value: u16) -> BinaryResult<()> {
    Ok(self.out.write_all(&value.to_be_bytes())?)
  }

  fn u32(&mut self, value: u32) -> BinaryResult<()> {
    Ok(self.out.write_all(&value.to_be_bytes())?)
  }

  fn i32(&mut self, value: i32) -> BinaryResult<()> {
    Ok(self.out.write_all(&value.to_be_bytes())?)
  }

  /// A count or length field
  fn length(&mut self, length: usize) -> BinaryResult<()> {
    let length = i32::try_from(length).map_err(|_| BinaryError::ValueTooLarge(length))?;
    self.i32(length)
  }

  /// An index field such as a code offset or slot
  fn index(&mut self, index: u32) -> BinaryResult<()> {
    let value = i32::try_from(index).map_err(|_| BinaryError::ValueTooLarge(index as usize))?;
    self.i32(value)
  }

  fn string(&mut self, value: &str) -> BinaryResult<()> {
    self.length(value.len())?;
    Ok(self.out.write_all(value.as_bytes())?)
  }

  fn strings(&mut self, values: &[String]) -> BinaryResult<()> {
    self.length(values.len())?;
    for value in values {
      self.string(value)?;
    }
    Ok(())
  }

  fn constant(&mut self, constant: &Constant) -> BinaryResult<()> {
    match constant {
      Constant::Null => self.u8(TAG_NULL),
      Constant::Byte(value) => {
        self.u8(TAG_BYTE)?;
        Ok(self.out.write_all(&value.to_be_bytes())?)
      },
      Constant::Bool(value) => {
        self.u8(TAG_BOOL)?;
        self.u8(*value as u8)
      },
      Constant::Short(value) => {
        self.u8(TAG_SHORT)?;
        Ok(self.out.write_all(&value.to_be_bytes())?)
      },
      Constant::Int(value) => {
        self.u8(TAG_INT)?;
        self.i32(*value)
      },
      Constant::Long(value) => {
        self.u8(TAG_LONG)?;
        Ok(self.out.write_all(&value.to_be_bytes())?)
      },
      Constant::Float(value) => {
        self.u8(TAG_FLOAT)?;
        Ok(self.out.write_all(&value.to_be_bytes())?)
      },
      Constant::Double(value) => {
        self.u8(TAG_DOUBLE)?;
        Ok(self.out.write_all(&value.to_be_bytes())?)
      },
      Constant::Str(value) => {
        self.u8(TAG_STRING)?;
        self.string(value)
      },
      Constant::Method(method) => {
        self.u8(TAG_METHOD)?;
        self.method(method)
      },
      Constant::Class(class) => {
        self.u8(TAG_CLASS)?;
        self.class(class)
      },
    }
  }

  fn import(&mut self, import: &Import) -> BinaryResult<()> {
    self.string(&import.module)?;
    self.u8(import.all as u8)?;
    self.strings(&import.symbols)?;
    self.strings(&import.aliases)
  }

  fn namespace(&mut self, namespace: &Namespace) -> BinaryResult<()> {
    self.length(namespace.len())?;
    for entry in namespace.iter() {
      self.string(&entry.name)?;
      self.u8(entry.flags.bits())?;
      self.constant(&entry.value)?;
    }
    Ok(())
  }

  fn method(&mut self, method: &CMethod) -> BinaryResult<()> {
    self.string(&method.name)?;
    self.index(method.locals)?;
    self.index(method.args)?;
    self.index(method.default_args)?;

    self.length(method.code.len())?;
    self.out.write_all(&method.code)?;

    self.length(method.exceptions.len())?;
    for entry in &method.exceptions {
      self.index(entry.start)?;
      self.index(entry.catch)?;
      self.index(entry.end)?;
      self.index(entry.local)?;
    }

    self.length(method.debug.len())?;
    for entry in &method.debug {
      self.index(entry.begin)?;
      self.index(entry.end)?;
      self.index(entry.line)?;
    }
    Ok(())
  }

  fn class(&mut self, class: &CClass) -> BinaryResult<()> {
    self.string(&class.name)?;
    self.method(&class.shared_init)?;
    self.namespace(&class.shared)?;
    self.method(&class.instance_init)?;
    self.namespace(&class.instance)
  }
}
