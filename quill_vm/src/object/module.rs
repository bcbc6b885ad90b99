use crate::value::Value;
use quill_core::{
  chunk::{CMethod, Constant, ConstantPool},
  constants::is_internal,
  Map,
};
use std::{cell::RefCell, sync::Arc};

/// A loaded module
pub struct Module {
  name: String,

  /// The constants instructions of this module's methods index
  pool: ConstantPool,

  /// Scalar constants of the pool, `Null` where the pool holds
  /// a method or class
  values: Vec<Value>,

  /// Module fields, classes included
  fields: RefCell<Map<String, Value>>,

  /// Module level methods
  methods: Map<String, Arc<CMethod>>,
}

impl Module {
  pub fn new(name: impl Into<String>, pool: ConstantPool, methods: Map<String, Arc<CMethod>>) -> Self {
    let values = pool
      .iter()
      .map(|constant| Value::from_constant(constant).unwrap_or(Value::Null))
      .collect();

    Self {
      name: name.into(),
      pool,
      values,
      fields: RefCell::new(Map::default()),
      methods,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn pool(&self) -> &ConstantPool {
    &self.pool
  }

  /// The constant at `index`
  pub fn constant(&self, index: usize) -> Option<&Constant> {
    self.pool.get(index)
  }

  /// The runtime value of the scalar constant at `index`
  pub fn value(&self, index: usize) -> Option<&Value> {
    self.values.get(index)
  }

  /// The string constant at `index`, used for member names
  pub fn name_at(&self, index: usize) -> Option<&str> {
    self.values.get(index).and_then(|value| value.as_str())
  }

  pub fn field(&self, name: &str) -> Option<Value> {
    self.fields.borrow().get(name).cloned()
  }

  /// Set an existing field returning false when it was never defined
  pub fn set_field(&self, name: &str, value: Value) -> bool {
    match self.fields.borrow_mut().get_mut(name) {
      Some(field) => {
        *field = value;
        true
      },
      None => false,
    }
  }

  pub fn define_field(&self, name: impl Into<String>, value: Value) {
    self.fields.borrow_mut().insert(name.into(), value);
  }

  pub fn method(&self, name: &str) -> Option<&Arc<CMethod>> {
    self.methods.get(name)
  }

  /// Does this module export `name`
  pub fn exports(&self, name: &str) -> bool {
    !is_internal(name) && (self.fields.borrow().contains_key(name) || self.methods.contains_key(name))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn fields_must_be_defined_before_set() {
    let module = Module::new("main", ConstantPool::default(), Map::default());
    assert!(!module.set_field("x", Value::Int(1)));

    module.define_field("x", Value::Null);
    assert!(module.set_field("x", Value::Int(1)));
    assert_eq!(module.field("x"), Some(Value::Int(1)));
    assert!(module.exports("x"));
  }

  #[test]
  fn scalar_values_mirror_pool() {
    let mut pool = ConstantPool::default();
    pool.add(Constant::Int(4));
    pool.add(Constant::Str("name".to_string()));
    pool.add(Constant::Method(Arc::new(CMethod::default())));
    let module = Module::new("main", pool, Map::default());

    assert_eq!(module.value(0), Some(&Value::Int(4)));
    assert_eq!(module.name_at(1), Some("name"));
    assert_eq!(module.value(2), Some(&Value::Null));
    assert!(module.constant(2).and_then(|c| c.as_method()).is_some());
  }

  #[test]
  fn internal_names_are_not_exported() {
    let module = Module::new("main", ConstantPool::default(), Map::default());
    module.define_field("$import$std", Value::Null);
    assert!(!module.exports("$import$std"));
  }
}
