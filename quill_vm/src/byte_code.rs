use std::{convert::TryFrom, fmt, mem};
use variant_count::VariantCount;

/// Width in bytes of every instruction operand
pub const OPERAND_WIDTH: usize = 4;

/// Encode an instruction into a code buffer
pub trait Encode {
  /// Append the encoding to `code` returning the number of bytes written
  fn encode(self, code: &mut Vec<u8>) -> u32;
}

/// Quill virtual machine byte codes with their operands
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AlignedByteCode {
  /// Return from the current method
  Return,

  /// Null literal
  Null,

  /// True literal
  True,

  /// False literal
  False,

  /// Push a constant from the constant pool
  Push(i32),

  /// Drop a value
  Pop,

  /// Get a local at the given slot
  GetLocal(i32),

  /// Set a local at the given slot
  SetLocal(i32),

  /// Wrap the value of a local slot in a box
  Box(i32),

  /// Store a fresh empty box in a local slot
  NewBox(i32),

  /// Get the value of a boxed local
  GetBox(i32),

  /// Set the value of a boxed local
  SetBox(i32),

  /// Get a captured value of the current closure
  GetCapture(i32),

  /// Set a captured value of the current closure
  SetCapture(i32),

  /// Create a closure from a method constant
  Closure(i32),

  /// Capture a boxed local of the current frame into a new closure
  CaptureLocal(i32),

  /// Capture an enclosing capture into a new closure
  CaptureEnclosing(i32),

  /// Push the current receiver
  PushSelf,

  /// Push the class of the current method
  PushClass,

  /// Push the module of the current method
  PushModule,

  /// Read a member named by a string constant
  GetField(i32),

  /// Write a member named by a string constant
  SetField(i32),

  /// Bind a method named by a string constant to its receiver
  Bind(i32),

  /// Call a callable with the given number of arguments
  Call(i32),

  /// Invoke a named member with the given number of arguments
  Invoke(i32, i32),

  /// Add the top two operands on the stack
  Add,

  /// Subtract the top two operands on the stack
  Subtract,

  /// Multiply the top two operands on the stack
  Multiply,

  /// Divide the top two operands on the stack
  Divide,

  /// Remainder of the top two operands on the stack
  Modulo,

  /// Negate a value
  Negate,

  /// Apply Not operator to top stack element
  Not,

  /// Apply equality between the top two operands on the stack
  Equal,

  /// Check if the top two operands on the stack are not equal
  NotEqual,

  /// Check if the 2nd from the top operand is < the top
  Less,

  /// Check if the 2nd from the top operand is <= the top
  LessEqual,

  /// Check if the 2nd from the top operand is > the top
  Greater,

  /// Check if the 2nd from the top operand is >= the top
  GreaterEqual,

  /// Perform a logical and operator
  And(i32),

  /// Perform a logical or operator
  Or(i32),

  /// Jump to an absolute code index
  Jump(i32),

  /// Jump to an absolute code index if the popped value is falsey
  JumpIfFalse(i32),

  /// Initialize list from literal
  List(i32),

  /// Replace the top of the stack with an iterator over it
  Iter,

  /// Push the next element of the iterator in a slot or jump when exhausted
  IterNext(i32, i32),

  /// Throw the top of the stack
  Throw,

  /// Push an imported module by its name constant
  Import(i32),

  /// Run the shared initializer of a class once
  InitClass,

  /// Skip a default argument when the caller provided it
  DefaultArg(i32, i32),
}

impl AlignedByteCode {
  /// Decode the instruction at `offset` returning it and the offset of the next
  pub fn decode(store: &[u8], offset: usize) -> Result<(AlignedByteCode, usize), DecodeError> {
    let byte = *store.get(offset).ok_or(DecodeError::Truncated(offset))?;
    let byte_code = ByteCode::try_from(byte).map_err(|_| DecodeError::InvalidOpCode(byte))?;
    let operand = |index: usize| decode_i32(store, offset + 1 + index * OPERAND_WIDTH);

    let decoded = match byte_code {
      ByteCode::Return => AlignedByteCode::Return,
      ByteCode::Null => AlignedByteCode::Null,
      ByteCode::True => AlignedByteCode::True,
      ByteCode::False => AlignedByteCode::False,
      ByteCode::Push => AlignedByteCode::Push(operand(0)?),
      ByteCode::Pop => AlignedByteCode::Pop,
      ByteCode::GetLocal => AlignedByteCode::GetLocal(operand(0)?),
      ByteCode::SetLocal => AlignedByteCode::SetLocal(operand(0)?),
      ByteCode::Box => AlignedByteCode::Box(operand(0)?),
      ByteCode::NewBox => AlignedByteCode::NewBox(operand(0)?),
      ByteCode::GetBox => AlignedByteCode::GetBox(operand(0)?),
      ByteCode::SetBox => AlignedByteCode::SetBox(operand(0)?),
      ByteCode::GetCapture => AlignedByteCode::GetCapture(operand(0)?),
      ByteCode::SetCapture => AlignedByteCode::SetCapture(operand(0)?),
      ByteCode::Closure => AlignedByteCode::Closure(operand(0)?),
      ByteCode::CaptureLocal => AlignedByteCode::CaptureLocal(operand(0)?),
      ByteCode::CaptureEnclosing => AlignedByteCode::CaptureEnclosing(operand(0)?),
      ByteCode::PushSelf => AlignedByteCode::PushSelf,
      ByteCode::PushClass => AlignedByteCode::PushClass,
      ByteCode::PushModule => AlignedByteCode::PushModule,
      ByteCode::GetField => AlignedByteCode::GetField(operand(0)?),
      ByteCode::SetField => AlignedByteCode::SetField(operand(0)?),
      ByteCode::Bind => AlignedByteCode::Bind(operand(0)?),
      ByteCode::Call => AlignedByteCode::Call(operand(0)?),
      ByteCode::Invoke => AlignedByteCode::Invoke(operand(0)?, operand(1)?),
      ByteCode::Add => AlignedByteCode::Add,
      ByteCode::Subtract => AlignedByteCode::Subtract,
      ByteCode::Multiply => AlignedByteCode::Multiply,
      ByteCode::Divide => AlignedByteCode::Divide,
      ByteCode::Modulo => AlignedByteCode::Modulo,
      ByteCode::Negate => AlignedByteCode::Negate,
      ByteCode::Not => AlignedByteCode::Not,
      ByteCode::Equal => AlignedByteCode::Equal,
      ByteCode::NotEqual => AlignedByteCode::NotEqual,
      ByteCode::Less => AlignedByteCode::Less,
      ByteCode::LessEqual => AlignedByteCode::LessEqual,
      ByteCode::Greater => AlignedByteCode::Greater,
      ByteCode::GreaterEqual => AlignedByteCode::GreaterEqual,
      ByteCode::And => AlignedByteCode::And(operand(0)?),
      ByteCode::Or => AlignedByteCode::Or(operand(0)?),
      ByteCode::Jump => AlignedByteCode::Jump(operand(0)?),
      ByteCode::JumpIfFalse => AlignedByteCode::JumpIfFalse(operand(0)?),
      ByteCode::List => AlignedByteCode::List(operand(0)?),
      ByteCode::Iter => AlignedByteCode::Iter,
      ByteCode::IterNext => AlignedByteCode::IterNext(operand(0)?, operand(1)?),
      ByteCode::Throw => AlignedByteCode::Throw,
      ByteCode::Import => AlignedByteCode::Import(operand(0)?),
      ByteCode::InitClass => AlignedByteCode::InitClass,
      ByteCode::DefaultArg => AlignedByteCode::DefaultArg(operand(0)?, operand(1)?),
    };

    Ok((decoded, offset + byte_code.width()))
  }

  /// What effect will this instruction have on the stack when it falls through
  pub fn stack_effect(&self) -> i32 {
    match self {
      AlignedByteCode::Return => -1,
      AlignedByteCode::Null => 1,
      AlignedByteCode::True => 1,
      AlignedByteCode::False => 1,
      AlignedByteCode::Push(_) => 1,
      AlignedByteCode::Pop => -1,
      AlignedByteCode::GetLocal(_) => 1,
      AlignedByteCode::SetLocal(_) => 0,
      AlignedByteCode::Box(_) => 0,
      AlignedByteCode::NewBox(_) => 0,
      AlignedByteCode::GetBox(_) => 1,
      AlignedByteCode::SetBox(_) => 0,
      AlignedByteCode::GetCapture(_) => 1,
      AlignedByteCode::SetCapture(_) => 0,
      AlignedByteCode::Closure(_) => 1,
      AlignedByteCode::CaptureLocal(_) => 0,
      AlignedByteCode::CaptureEnclosing(_) => 0,
      AlignedByteCode::PushSelf => 1,
      AlignedByteCode::PushClass => 1,
      AlignedByteCode::PushModule => 1,
      AlignedByteCode::GetField(_) => 0,
      AlignedByteCode::SetField(_) => -1,
      AlignedByteCode::Bind(_) => 0,
      AlignedByteCode::Call(args) => -args,
      AlignedByteCode::Invoke(_, args) => -args,
      AlignedByteCode::Add => -1,
      AlignedByteCode::Subtract => -1,
      AlignedByteCode::Multiply => -1,
      AlignedByteCode::Divide => -1,
      AlignedByteCode::Modulo => -1,
      AlignedByteCode::Negate => 0,
      AlignedByteCode::Not => 0,
      AlignedByteCode::Equal => -1,
      AlignedByteCode::NotEqual => -1,
      AlignedByteCode::Less => -1,
      AlignedByteCode::LessEqual => -1,
      AlignedByteCode::Greater => -1,
      AlignedByteCode::GreaterEqual => -1,
      AlignedByteCode::And(_) => -1,
      AlignedByteCode::Or(_) => -1,
      AlignedByteCode::Jump(_) => 0,
      AlignedByteCode::JumpIfFalse(_) => -1,
      AlignedByteCode::List(count) => 1 - count,
      AlignedByteCode::Iter => 0,
      AlignedByteCode::IterNext(_, _) => 1,
      AlignedByteCode::Throw => -1,
      AlignedByteCode::Import(_) => 1,
      AlignedByteCode::InitClass => -1,
      AlignedByteCode::DefaultArg(_, _) => 0,
    }
  }

  /// The jump target and the stack effect when the jump is taken
  pub fn jump(&self) -> Option<(i32, i32)> {
    match self {
      AlignedByteCode::Jump(target) => Some((*target, 0)),
      AlignedByteCode::JumpIfFalse(target) => Some((*target, -1)),
      AlignedByteCode::And(target) => Some((*target, 0)),
      AlignedByteCode::Or(target) => Some((*target, 0)),
      AlignedByteCode::IterNext(_, target) => Some((*target, 0)),
      AlignedByteCode::DefaultArg(_, target) => Some((*target, 0)),
      _ => None,
    }
  }

  /// Does control never continue to the next instruction
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      AlignedByteCode::Return | AlignedByteCode::Throw | AlignedByteCode::Jump(_)
    )
  }
}

impl Encode for AlignedByteCode {
  fn encode(self, code: &mut Vec<u8>) -> u32 {
    match self {
      Self::Return => op(code, ByteCode::Return),
      Self::Null => op(code, ByteCode::Null),
      Self::True => op(code, ByteCode::True),
      Self::False => op(code, ByteCode::False),
      Self::Push(index) => op_int(code, ByteCode::Push, index),
      Self::Pop => op(code, ByteCode::Pop),
      Self::GetLocal(slot) => op_int(code, ByteCode::GetLocal, slot),
      Self::SetLocal(slot) => op_int(code, ByteCode::SetLocal, slot),
      Self::Box(slot) => op_int(code, ByteCode::Box, slot),
      Self::NewBox(slot) => op_int(code, ByteCode::NewBox, slot),
      Self::GetBox(slot) => op_int(code, ByteCode::GetBox, slot),
      Self::SetBox(slot) => op_int(code, ByteCode::SetBox, slot),
      Self::GetCapture(index) => op_int(code, ByteCode::GetCapture, index),
      Self::SetCapture(index) => op_int(code, ByteCode::SetCapture, index),
      Self::Closure(index) => op_int(code, ByteCode::Closure, index),
      Self::CaptureLocal(slot) => op_int(code, ByteCode::CaptureLocal, slot),
      Self::CaptureEnclosing(index) => op_int(code, ByteCode::CaptureEnclosing, index),
      Self::PushSelf => op(code, ByteCode::PushSelf),
      Self::PushClass => op(code, ByteCode::PushClass),
      Self::PushModule => op(code, ByteCode::PushModule),
      Self::GetField(name) => op_int(code, ByteCode::GetField, name),
      Self::SetField(name) => op_int(code, ByteCode::SetField, name),
      Self::Bind(name) => op_int(code, ByteCode::Bind, name),
      Self::Call(args) => op_int(code, ByteCode::Call, args),
      Self::Invoke(name, args) => op_int_pair(code, ByteCode::Invoke, name, args),
      Self::Add => op(code, ByteCode::Add),
      Self::Subtract => op(code, ByteCode::Subtract),
      Self::Multiply => op(code, ByteCode::Multiply),
      Self::Divide => op(code, ByteCode::Divide),
      Self::Modulo => op(code, ByteCode::Modulo),
      Self::Negate => op(code, ByteCode::Negate),
      Self::Not => op(code, ByteCode::Not),
      Self::Equal => op(code, ByteCode::Equal),
      Self::NotEqual => op(code, ByteCode::NotEqual),
      Self::Less => op(code, ByteCode::Less),
      Self::LessEqual => op(code, ByteCode::LessEqual),
      Self::Greater => op(code, ByteCode::Greater),
      Self::GreaterEqual => op(code, ByteCode::GreaterEqual),
      Self::And(target) => op_int(code, ByteCode::And, target),
      Self::Or(target) => op_int(code, ByteCode::Or, target),
      Self::Jump(target) => op_int(code, ByteCode::Jump, target),
      Self::JumpIfFalse(target) => op_int(code, ByteCode::JumpIfFalse, target),
      Self::List(count) => op_int(code, ByteCode::List, count),
      Self::Iter => op(code, ByteCode::Iter),
      Self::IterNext(slot, target) => op_int_pair(code, ByteCode::IterNext, slot, target),
      Self::Throw => op(code, ByteCode::Throw),
      Self::Import(name) => op_int(code, ByteCode::Import, name),
      Self::InitClass => op(code, ByteCode::InitClass),
      Self::DefaultArg(slot, target) => op_int_pair(code, ByteCode::DefaultArg, slot, target),
    }
  }
}

fn op(code: &mut Vec<u8>, byte_code: ByteCode) -> u32 {
  code.push(byte_code.to_byte());
  1
}

fn op_int(code: &mut Vec<u8>, byte_code: ByteCode, operand: i32) -> u32 {
  code.push(byte_code.to_byte());
  code.extend_from_slice(&operand.to_be_bytes());
  5
}

fn op_int_pair(code: &mut Vec<u8>, byte_code: ByteCode, first: i32, second: i32) -> u32 {
  code.push(byte_code.to_byte());
  code.extend_from_slice(&first.to_be_bytes());
  code.extend_from_slice(&second.to_be_bytes());
  9
}

/// Quill virtual machine raw byte codes
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, VariantCount)]
pub enum ByteCode {
  Return,
  Null,
  True,
  False,
  Push,
  Pop,
  GetLocal,
  SetLocal,
  Box,
  NewBox,
  GetBox,
  SetBox,
  GetCapture,
  SetCapture,
  Closure,
  CaptureLocal,
  CaptureEnclosing,
  PushSelf,
  PushClass,
  PushModule,
  GetField,
  SetField,
  Bind,
  Call,
  Invoke,
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulo,
  Negate,
  Not,
  Equal,
  NotEqual,
  Less,
  LessEqual,
  Greater,
  GreaterEqual,
  And,
  Or,
  Jump,
  JumpIfFalse,
  List,
  Iter,
  IterNext,
  Throw,
  Import,
  InitClass,
  DefaultArg,
}

impl ByteCode {
  /// Convert this bytecode to its underlying byte.
  fn to_byte(self) -> u8 {
    self as u8
  }

  /// Number of operands following the opcode
  pub fn operands(self) -> usize {
    match self {
      ByteCode::Invoke | ByteCode::IterNext | ByteCode::DefaultArg => 2,
      ByteCode::Return
      | ByteCode::Null
      | ByteCode::True
      | ByteCode::False
      | ByteCode::Pop
      | ByteCode::PushSelf
      | ByteCode::PushClass
      | ByteCode::PushModule
      | ByteCode::Add
      | ByteCode::Subtract
      | ByteCode::Multiply
      | ByteCode::Divide
      | ByteCode::Modulo
      | ByteCode::Negate
      | ByteCode::Not
      | ByteCode::Equal
      | ByteCode::NotEqual
      | ByteCode::Less
      | ByteCode::LessEqual
      | ByteCode::Greater
      | ByteCode::GreaterEqual
      | ByteCode::Iter
      | ByteCode::Throw
      | ByteCode::InitClass => 0,
      _ => 1,
    }
  }

  /// Width of the whole instruction in bytes
  pub fn width(self) -> usize {
    1 + self.operands() * OPERAND_WIDTH
  }
}

impl TryFrom<u8> for ByteCode {
  type Error = u8;

  /// Get the enum bytecode for a raw byte
  #[inline]
  fn try_from(byte: u8) -> Result<Self, Self::Error> {
    if (byte as usize) < ByteCode::VARIANT_COUNT {
      // ByteCode is repr(u8) with contiguous discriminants below VARIANT_COUNT
      Ok(unsafe { mem::transmute::<u8, ByteCode>(byte) })
    } else {
      Err(byte)
    }
  }
}

/// Failure to decode an instruction
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
  /// The byte is not a known opcode
  InvalidOpCode(u8),

  /// The instruction runs past the end of the code
  Truncated(usize),
}

impl fmt::Display for DecodeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DecodeError::InvalidOpCode(byte) => write!(f, "Invalid opcode {byte}"),
      DecodeError::Truncated(offset) => write!(f, "Truncated instruction at {offset}"),
    }
  }
}

fn decode_i32(store: &[u8], offset: usize) -> Result<i32, DecodeError> {
  store
    .get(offset..offset + OPERAND_WIDTH)
    .and_then(|bytes| <[u8; OPERAND_WIDTH]>::try_from(bytes).ok())
    .map(i32::from_be_bytes)
    .ok_or(DecodeError::Truncated(offset))
}
