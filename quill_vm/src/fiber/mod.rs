mod call_frame;
mod suspend;

pub use call_frame::{CallFrame, FrameKind};
pub use suspend::{Continuation, FrameSnapshot, Step, StepResult, Unwind};

use crate::value::Value;
use log::trace;
use std::{
  mem,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

/// The lifecycle of a fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
  Created,
  Running,
  Suspended,
  Returned,
  Failed,
}

/// Requests cooperative cancellation of a fiber from any thread
#[derive(Debug, Clone)]
pub struct InterruptHandle {
  flag: Arc<AtomicBool>,
}

impl InterruptHandle {
  /// Raise an interrupt at the fiber's next check
  pub fn interrupt(&self) {
    self.flag.store(true, Ordering::Release);
  }

  pub fn is_interrupted(&self) -> bool {
    self.flag.load(Ordering::Acquire)
  }
}

/// A thread of execution with its own frames, locals and suspensions
pub struct Fiber {
  /// The operand stack
  stack: Vec<Value>,

  /// Flat local storage, each frame owns a window
  locals: Vec<Value>,

  /// One past the last local slot in use
  sp: usize,

  /// The base of each frame's window, parallel to `frames`
  frame_pointers: Vec<usize>,

  frames: Vec<CallFrame>,

  /// Captured work, most recent last
  suspensions: Vec<Continuation>,

  /// Continuations pushed by the suspension currently propagating
  unwind_depth: usize,

  /// What the last suspension was waiting on
  cause: Value,

  state: FiberState,

  interrupt: Arc<AtomicBool>,
}

impl Default for Fiber {
  fn default() -> Self {
    Self::new()
  }
}

impl Fiber {
  /// A fiber with its own interrupt flag
  pub fn new() -> Self {
    Self::with_interrupt(Arc::new(AtomicBool::new(false)))
  }

  /// A fiber observing `interrupt`. Any pending interrupt is cleared
  pub fn with_interrupt(interrupt: Arc<AtomicBool>) -> Self {
    interrupt.store(false, Ordering::Release);
    Self {
      stack: Vec::with_capacity(64),
      locals: Vec::with_capacity(64),
      sp: 0,
      frame_pointers: vec![],
      frames: vec![],
      suspensions: vec![],
      unwind_depth: 0,
      cause: Value::Null,
      state: FiberState::Created,
      interrupt,
    }
  }

  pub fn state(&self) -> FiberState {
    self.state
  }

  pub fn set_state(&mut self, state: FiberState) {
    trace!("fiber {:?} -> {:?}", self.state, state);
    self.state = state;
  }

  pub fn interrupt_handle(&self) -> InterruptHandle {
    InterruptHandle {
      flag: Arc::clone(&self.interrupt),
    }
  }

  /// The flag a successor of this fiber may inherit
  pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
    Arc::clone(&self.interrupt)
  }

  /// Consume a pending interrupt
  pub fn take_interrupt(&self) -> bool {
    self.interrupt.swap(false, Ordering::AcqRel)
  }

  pub fn push(&mut self, value: Value) {
    self.stack.push(value);
  }

  pub fn pop(&mut self) -> Value {
    self.stack.pop().unwrap_or(Value::Null)
  }

  /// The value `distance` from the top of the stack
  pub fn peek(&self, distance: usize) -> &Value {
    let len = self.stack.len();
    match len.checked_sub(distance + 1) {
      Some(index) => &self.stack[index],
      None => &Value::Null,
    }
  }

  /// Pop the top `count` values in push order
  pub fn pop_n(&mut self, count: usize) -> Vec<Value> {
    let at = self.stack.len().saturating_sub(count);
    self.stack.split_off(at)
  }

  pub fn stack_len(&self) -> usize {
    self.stack.len()
  }

  /// Reserve a window of `count` null locals for a new frame,
  /// returning its base
  pub fn pre_call(&mut self, count: usize) -> usize {
    let fp = self.sp;
    self.frame_pointers.push(fp);
    self.sp += count;

    if self.locals.len() < self.sp {
      self.locals.resize(self.sp, Value::Null);
    }
    for slot in &mut self.locals[fp..self.sp] {
      *slot = Value::Null;
    }
    fp
  }

  /// Release the window of the frame being left
  pub fn post_call(&mut self) {
    if let Some(fp) = self.frame_pointers.pop() {
      self.sp = fp;
    }
  }

  fn fp(&self) -> usize {
    self.frame_pointers.last().copied().unwrap_or(0)
  }

  pub fn local(&self, slot: usize) -> &Value {
    self.locals.get(self.fp() + slot).unwrap_or(&Value::Null)
  }

  pub fn set_local(&mut self, slot: usize, value: Value) {
    let index = self.fp() + slot;
    if let Some(local) = self.locals.get_mut(index) {
      *local = value;
    }
  }

  pub fn frame(&self) -> Option<&CallFrame> {
    self.frames.last()
  }

  pub fn frame_count(&self) -> usize {
    self.frames.len()
  }

  pub fn push_frame(&mut self, frame: CallFrame) {
    self.frames.push(frame);
  }

  /// Leave the innermost frame discarding its operands and locals
  pub fn pop_frame(&mut self) -> Option<CallFrame> {
    let frame = self.frames.pop()?;
    self.stack.truncate(frame.stack_base);
    self.post_call();
    Some(frame)
  }

  /// Record `ip` as executing and continue at `next`
  pub fn advance(&mut self, ip: usize, next: usize) {
    if let Some(frame) = self.frames.last_mut() {
      frame.last_ip = ip;
      frame.ip = next;
      frame.started = true;
    }
  }

  pub fn jump(&mut self, target: usize) {
    if let Some(frame) = self.frames.last_mut() {
      frame.ip = target;
    }
  }

  /// Enter the handler at `target` binding `error` to `local`
  pub fn catch(&mut self, target: usize, local: usize, error: Value) {
    if let Some(frame) = self.frames.last_mut() {
      frame.ip = target;
      let base = frame.stack_base;
      self.stack.truncate(base);
    }
    self.set_local(local, error);
  }

  /// Remove every frame from `bottom` up as a continuation
  pub fn capture(&mut self, bottom: usize) -> Continuation {
    let frames = self.frames.split_off(bottom.min(self.frames.len()));
    let pointers = self
      .frame_pointers
      .split_off(bottom.min(self.frame_pointers.len()));

    let stack_base = frames
      .first()
      .map_or(self.stack.len(), |frame| frame.stack_base);
    let locals_base = pointers.first().copied().unwrap_or(self.sp);

    let stack = self.stack.split_off(stack_base.min(self.stack.len()));
    let locals = self.locals[locals_base..self.sp].to_vec();
    self.sp = locals_base;

    Continuation::Frames(FrameSnapshot {
      frames: frames
        .into_iter()
        .map(|mut frame| {
          frame.stack_base -= stack_base;
          frame
        })
        .collect(),
      stack,
      locals,
      frame_pointers: pointers.iter().map(|fp| fp - locals_base).collect(),
    })
  }

  /// Reinstate captured frames above the current ones
  pub fn restore(&mut self, snapshot: FrameSnapshot) {
    let stack_base = self.stack.len();
    let locals_base = self.sp;

    self.sp += snapshot.locals.len();
    if self.locals.len() < self.sp {
      self.locals.resize(self.sp, Value::Null);
    }
    for (offset, value) in snapshot.locals.into_iter().enumerate() {
      self.locals[locals_base + offset] = value;
    }

    self.stack.extend(snapshot.stack);
    self
      .frame_pointers
      .extend(snapshot.frame_pointers.iter().map(|fp| fp + locals_base));
    self
      .frames
      .extend(snapshot.frames.into_iter().map(|mut frame| {
        frame.stack_base += stack_base;
        frame
      }));
  }

  /// Push a continuation beneath those already pushed by the
  /// suspension currently propagating
  pub fn push_suspension(&mut self, continuation: Continuation) {
    let index = self.suspensions.len() - self.unwind_depth.min(self.suspensions.len());
    self.suspensions.insert(index, continuation);
    self.unwind_depth += 1;
  }

  pub fn pop_suspension(&mut self) -> Option<Continuation> {
    self.suspensions.pop()
  }

  /// The value the next continuation receives when resumed without one
  pub fn pending_partial(&self) -> Value {
    self
      .suspensions
      .last()
      .map_or(Value::Null, |continuation| continuation.partial())
  }

  pub fn suspension_count(&self) -> usize {
    self.suspensions.len()
  }

  /// The suspension reached the outermost caller
  pub fn end_unwind(&mut self) {
    self.unwind_depth = 0;
  }

  pub fn cause(&self) -> &Value {
    &self.cause
  }

  pub fn set_cause(&mut self, cause: Value) {
    self.cause = cause;
  }

  /// Drop every frame, operand and suspension
  pub fn clear(&mut self) {
    self.stack.clear();
    self.frames.clear();
    self.frame_pointers.clear();
    self.sp = 0;
    self.unwind_depth = 0;
    mem::take(&mut self.suspensions);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::object::{Closure, Module};
  use quill_core::{
    chunk::{CMethod, ConstantPool},
    Map,
  };
  use std::rc::Rc;

  fn fiber() -> Fiber {
    Fiber::new()
  }

  fn closure() -> Rc<Closure> {
    let module = Rc::new(Module::new("main", ConstantPool::default(), Map::default()));
    Rc::new(Closure::new(
      Arc::new(CMethod::default()),
      module,
      None,
      Value::Null,
    ))
  }

  mod locals {
    use super::*;

    #[test]
    fn windows_are_private() {
      let mut fiber = fiber();
      fiber.pre_call(2);
      fiber.set_local(1, Value::Int(1));

      let fp = fiber.pre_call(3);
      assert_eq!(fp, 2);
      assert_eq!(fiber.local(1), &Value::Null);
      fiber.set_local(1, Value::Int(2));

      fiber.post_call();
      assert_eq!(fiber.local(1), &Value::Int(1));
    }

    #[test]
    fn reused_windows_start_null() {
      let mut fiber = fiber();
      fiber.pre_call(1);
      fiber.set_local(0, Value::Int(5));
      fiber.post_call();

      fiber.pre_call(1);
      assert_eq!(fiber.local(0), &Value::Null);
    }
  }

  mod suspensions {
    use super::*;

    fn steps(partial: i64) -> Continuation {
      Continuation::Steps {
        partial: Value::Int(partial),
        steps: vec![],
      }
    }

    #[test]
    fn outer_continuations_go_beneath_inner() {
      let mut fiber = fiber();
      fiber.push_suspension(steps(0));
      fiber.end_unwind();

      fiber.push_suspension(steps(1));
      fiber.push_suspension(steps(2));
      fiber.end_unwind();

      let order: Vec<Value> = std::iter::from_fn(|| fiber.pop_suspension())
        .map(|continuation| continuation.partial())
        .collect();
      assert_eq!(order, vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
    }

    #[test]
    fn capture_and_restore_rebase() {
      let mut fiber = fiber();
      fiber.push(Value::Int(9));
      fiber.pre_call(1);
      fiber.push_frame(CallFrame::new(closure(), 1, 0, FrameKind::Normal));
      fiber.set_local(0, Value::Int(3));
      fiber.push(Value::Int(4));

      let snapshot = match fiber.capture(0) {
        Continuation::Frames(snapshot) => snapshot,
        _ => panic!("expected frames"),
      };
      assert_eq!(fiber.frame_count(), 0);
      assert_eq!(fiber.stack_len(), 1);
      assert_eq!(snapshot.frames[0].stack_base, 0);
      assert_eq!(snapshot.stack, vec![Value::Int(4)]);

      fiber.pre_call(2);
      fiber.restore(snapshot);
      assert_eq!(fiber.frame_count(), 1);
      assert_eq!(fiber.local(0), &Value::Int(3));
      assert_eq!(fiber.pop(), Value::Int(4));
      assert_eq!(fiber.frame().map(|frame| frame.stack_base), Some(1));
    }
  }

  #[test]
  fn interrupt_is_consumed() {
    let fiber = fiber();
    let handle = fiber.interrupt_handle();
    handle.interrupt();

    assert!(handle.is_interrupted());
    assert!(fiber.take_interrupt());
    assert!(!fiber.take_interrupt());
  }

  #[test]
  fn fibers_own_their_interrupts() {
    let first = fiber();
    let second = fiber();
    first.interrupt_handle().interrupt();

    assert!(!second.take_interrupt());
    assert!(first.take_interrupt());
  }

  #[test]
  fn inherited_interrupts_start_cleared() {
    let first = fiber();
    first.interrupt_handle().interrupt();

    let second = Fiber::with_interrupt(first.interrupt_flag());
    assert!(!second.take_interrupt());
  }

  #[test]
  fn frames_start_on_first_advance() {
    let mut fiber = fiber();
    fiber.pre_call(0);
    fiber.push_frame(CallFrame::new(closure(), 0, 0, FrameKind::Normal));
    assert_eq!(fiber.frame().map(|frame| frame.started), Some(false));

    fiber.advance(0, 1);
    assert_eq!(fiber.frame().map(|frame| frame.started), Some(true));
  }
}
