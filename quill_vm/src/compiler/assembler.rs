use super::error::{CompileError, CompileResult};
use crate::byte_code::{AlignedByteCode, Encode, OPERAND_WIDTH};
use quill_core::{
  chunk::{CMethod, Constant, ConstantPool, DebugEntry, ExceptionEntry},
  utils::IdEmitter,
  Map,
};

/// A forward reference to a label, the operand at `index` is
/// patched with the label's target
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Label {
  pub name: String,
  pub index: usize,
}

/// The code index a label resolves to
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LabelTarget {
  pub name: String,
  pub index: usize,
}

/// Accumulates the instructions of a single method
#[derive(Debug, Default)]
pub struct Assembler {
  code: Vec<u8>,

  /// The module wide constant pool, lent to each method in turn
  pool: ConstantPool,

  labels: Vec<Label>,
  targets: Map<String, usize>,
  duplicate_targets: Vec<String>,
  label_ids: IdEmitter,

  debug: Vec<DebugEntry>,

  /// The line currently being emitted and where it began
  open_line: Option<(usize, u32)>,

  exceptions: Vec<ExceptionEntry>,

  /// Simulated operand stack depth of straight line execution
  depth: i32,
}

impl Assembler {
  pub fn new(pool: ConstantPool) -> Self {
    Self {
      pool,
      ..Default::default()
    }
  }

  /// The index the next instruction will be written to
  pub fn position(&self) -> usize {
    self.code.len()
  }

  pub fn depth(&self) -> i32 {
    self.depth
  }

  /// Write an instruction
  pub fn emit(&mut self, op: AlignedByteCode) {
    self.depth += op.stack_effect();
    op.encode(&mut self.code);
  }

  /// Write a jumping instruction whose target is the label `name`.
  /// The target operand is always the last operand of the instruction.
  pub fn emit_jump(&mut self, op: AlignedByteCode, name: &str) {
    self.emit(op);
    let index = self.code.len() - OPERAND_WIDTH;
    self.labels.push(Label {
      name: name.to_string(),
      index,
    });
  }

  /// Record the current index as a forward reference site and reserve
  /// its operand
  pub fn label(&mut self, name: Option<&str>) -> Label {
    let name = match name {
      Some(name) => name.to_string(),
      None => self.fresh_label("label"),
    };

    let label = Label {
      name,
      index: self.code.len(),
    };
    self.code.extend_from_slice(&[0; OPERAND_WIDTH]);
    self.labels.push(label.clone());
    label
  }

  /// A label name unique within this method
  pub fn fresh_label(&mut self, prefix: &str) -> String {
    format!("{}_{}", prefix, self.label_ids.emit())
  }

  /// Resolve the label `name` to the current index
  pub fn set_label_target(&mut self, name: &str) -> LabelTarget {
    let index = self.code.len();
    if self.targets.insert(name.to_string(), index).is_some() {
      self.duplicate_targets.push(name.to_string());
    }

    LabelTarget {
      name: name.to_string(),
      index,
    }
  }

  /// Index of `value` in the constant pool, adding it when absent
  pub fn constant(&mut self, value: Constant) -> i32 {
    self.pool.add(value) as i32
  }

  /// Attribute subsequently emitted code to `line`
  pub fn on_line(&mut self, line: u32) {
    let position = self.code.len();

    match self.open_line {
      Some((_, open)) if open == line => (),
      Some((begin, open)) => {
        if begin < position {
          self.debug.push(DebugEntry {
            begin: begin as u32,
            end: position as u32,
            line: open,
          });
        }
        self.open_line = Some((position, line));
      },
      None => self.open_line = Some((position, line)),
    }
  }

  pub fn add_exception(&mut self, entry: ExceptionEntry) {
    self.exceptions.push(entry);
  }

  /// The finished code with every label patched
  pub fn code_segment(&mut self) -> CompileResult<Vec<u8>> {
    if let Some(name) = self.duplicate_targets.first() {
      return Err(CompileError::assembly(format!(
        "label '{name}' was targeted more than once"
      )));
    }

    for label in &self.labels {
      let target = self.targets.get(&label.name).ok_or_else(|| {
        CompileError::assembly(format!("label '{}' has no target", label.name))
      })?;

      let bytes = (*target as i32).to_be_bytes();
      self.code[label.index..label.index + OPERAND_WIDTH].copy_from_slice(&bytes);
    }

    Ok(self.code.clone())
  }

  /// Close the open line and return the line table
  pub fn debug_table(&mut self) -> Vec<DebugEntry> {
    if let Some((begin, line)) = self.open_line.take() {
      let position = self.code.len();
      if begin < position {
        self.debug.push(DebugEntry {
          begin: begin as u32,
          end: position as u32,
          line,
        });
      }
    }

    self.debug.clone()
  }

  /// Give back the constant pool
  pub fn take_pool(&mut self) -> ConstantPool {
    std::mem::take(&mut self.pool)
  }

  /// Lend the constant pool back to this assembler
  pub fn give_pool(&mut self, pool: ConstantPool) {
    self.pool = pool;
  }

  /// Assemble the finished method
  pub fn finish(&mut self, name: &str, locals: u32, args: u32, default_args: u32) -> CompileResult<CMethod> {
    let code = self.code_segment()?;
    let debug = self.debug_table();

    Ok(CMethod {
      name: name.to_string(),
      locals,
      args,
      default_args,
      code,
      exceptions: self.exceptions.clone(),
      debug,
    })
  }
}
