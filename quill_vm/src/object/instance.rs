use super::Class;
use crate::value::Value;
use quill_core::Map;
use std::{cell::RefCell, rc::Rc};

/// An instance of a class
pub struct Instance {
  class: Rc<Class>,
  fields: RefCell<Map<String, Value>>,
}

impl Instance {
  /// A new instance with every declared field null
  pub fn new(class: Rc<Class>) -> Self {
    let fields = class
      .fields()
      .iter()
      .map(|name| (name.clone(), Value::Null))
      .collect();

    Self {
      class,
      fields: RefCell::new(fields),
    }
  }

  pub fn class(&self) -> &Rc<Class> {
    &self.class
  }

  pub fn field(&self, name: &str) -> Option<Value> {
    self.fields.borrow().get(name).cloned()
  }

  /// Set a declared field returning false when it does not exist
  pub fn set_field(&self, name: &str, value: Value) -> bool {
    match self.fields.borrow_mut().get_mut(name) {
      Some(field) => {
        *field = value;
        true
      },
      None => false,
    }
  }
}
