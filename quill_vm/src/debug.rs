use crate::byte_code::AlignedByteCode;
use quill_core::chunk::{CMethod, CModule, ConstantPool};
use std::io::{self, Write};

/// Write every method of `module`, class methods included
pub fn disassemble_module(out: &mut dyn Write, module: &CModule) -> io::Result<()> {
  writeln!(out, "== module {} ==", module.name)?;

  for entry in module.namespace.iter() {
    if let Some(method) = entry.value.as_method() {
      disassemble_method(out, method, &module.constants)?;
    }

    if let Some(class) = entry.value.as_class() {
      disassemble_method(out, &class.shared_init, &module.constants)?;
      disassemble_method(out, &class.instance_init, &module.constants)?;

      for member in class.shared.iter().chain(class.instance.iter()) {
        if let Some(method) = member.value.as_method() {
          disassemble_method(out, method, &module.constants)?;
        }
      }
    }
  }

  Ok(())
}

/// Write each instruction of `method`
pub fn disassemble_method(out: &mut dyn Write, method: &CMethod, pool: &ConstantPool) -> io::Result<()> {
  writeln!(out)?;
  writeln!(
    out,
    "{} (locals {}, args {}, defaults {})",
    method.name, method.locals, method.args, method.default_args
  )?;

  let mut offset = 0;
  while offset < method.code.len() {
    offset = disassemble_instruction(out, method, pool, offset)?;
  }

  for entry in &method.exceptions {
    writeln!(
      out,
      "  catch {:0>4}..{:0>4} -> {:0>4} local {}",
      entry.start, entry.end, entry.catch, entry.local
    )?;
  }

  Ok(())
}

/// Write the instruction at `offset` returning the offset of the next
pub fn disassemble_instruction(
  out: &mut dyn Write,
  method: &CMethod,
  pool: &ConstantPool,
  offset: usize,
) -> io::Result<usize> {
  write!(out, "  {offset:0>4} ")?;

  let line = method.line_at(offset);
  let previous = offset
    .checked_sub(1)
    .and_then(|previous| method.line_at(previous));
  match line {
    Some(line) if previous != Some(line) => write!(out, "{line:>4} ")?,
    _ => write!(out, "   | ")?,
  }

  let (op, next) = match AlignedByteCode::decode(&method.code, offset) {
    Ok(decoded) => decoded,
    Err(error) => {
      writeln!(out, "{error}")?;
      return Ok(method.code.len());
    },
  };

  let constant = match op {
    AlignedByteCode::Push(index)
    | AlignedByteCode::Closure(index)
    | AlignedByteCode::GetField(index)
    | AlignedByteCode::SetField(index)
    | AlignedByteCode::Bind(index)
    | AlignedByteCode::Invoke(index, _)
    | AlignedByteCode::Import(index) => pool.get(index as usize),
    _ => None,
  };

  match constant {
    Some(constant) => writeln!(out, "{op:?} {constant}")?,
    None => writeln!(out, "{op:?}")?,
  }

  Ok(next)
}
