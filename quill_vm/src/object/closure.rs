use super::{Class, Module};
use crate::value::Value;
use quill_core::chunk::CMethod;
use std::{cell::RefCell, rc::Rc, sync::Arc};

/// A method paired with the context it runs in
pub struct Closure {
  method: Arc<CMethod>,

  /// The module whose constants the method indexes
  module: Rc<Module>,

  /// The class the method was declared in
  class: Option<Rc<Class>>,

  /// The value `self` refers to
  receiver: Value,

  /// Boxes of the captured locals
  captures: RefCell<Vec<Rc<RefCell<Value>>>>,
}

impl Closure {
  pub fn new(method: Arc<CMethod>, module: Rc<Module>, class: Option<Rc<Class>>, receiver: Value) -> Self {
    Self {
      method,
      module,
      class,
      receiver,
      captures: RefCell::new(vec![]),
    }
  }

  pub fn method(&self) -> &Arc<CMethod> {
    &self.method
  }

  pub fn module(&self) -> &Rc<Module> {
    &self.module
  }

  pub fn class(&self) -> Option<&Rc<Class>> {
    self.class.as_ref()
  }

  pub fn receiver(&self) -> &Value {
    &self.receiver
  }

  pub fn capture(&self, index: usize) -> Option<Rc<RefCell<Value>>> {
    self.captures.borrow().get(index).cloned()
  }

  pub fn push_capture(&self, capture: Rc<RefCell<Value>>) {
    self.captures.borrow_mut().push(capture);
  }
}
