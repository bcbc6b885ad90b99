use super::Module;
use crate::value::Value;
use quill_core::{
  chunk::{CClass, CMethod, Namespace},
  constants::constructor_name,
  Map,
};
use std::{
  cell::{Cell, RefCell},
  rc::{Rc, Weak},
  sync::Arc,
};

/// A loaded class
pub struct Class {
  name: String,

  /// The module this class was declared in
  module: Weak<Module>,

  shared_fields: RefCell<Map<String, Value>>,
  shared_methods: Map<String, Arc<CMethod>>,

  /// Instance methods, the constructor included
  methods: Map<String, Arc<CMethod>>,

  /// Instance field names in declaration order
  fields: Vec<String>,

  /// Instance fields whose values are consulted for missing members
  traits: Vec<String>,

  shared_init: Arc<CMethod>,
  instance_init: Arc<CMethod>,

  init: Cell<InitState>,
}

/// Progress of a class's shared initializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
  Pending,
  Running,
  Done,
}

fn split(namespace: &Namespace) -> (Vec<String>, Map<String, Arc<CMethod>>) {
  let mut fields = vec![];
  let mut methods = Map::default();

  for entry in namespace.iter() {
    match entry.value.as_method() {
      Some(method) => {
        methods.insert(entry.name.clone(), Arc::clone(method));
      },
      None => fields.push(entry.name.clone()),
    }
  }

  (fields, methods)
}

impl Class {
  pub fn new(class: &CClass, module: &Rc<Module>) -> Self {
    let (shared_fields, shared_methods) = split(&class.shared);
    let (fields, methods) = split(&class.instance);

    Self {
      name: class.name.clone(),
      module: Rc::downgrade(module),
      shared_fields: RefCell::new(
        shared_fields
          .into_iter()
          .map(|name| (name, Value::Null))
          .collect(),
      ),
      shared_methods,
      methods,
      fields,
      traits: class.traits().into_iter().map(String::from).collect(),
      shared_init: Arc::new(class.shared_init.clone()),
      instance_init: Arc::new(class.instance_init.clone()),
      init: Cell::new(InitState::Pending),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn module(&self) -> Option<Rc<Module>> {
    self.module.upgrade()
  }

  pub fn shared_field(&self, name: &str) -> Option<Value> {
    self.shared_fields.borrow().get(name).cloned()
  }

  /// Set an existing shared field returning false when it does not exist
  pub fn set_shared_field(&self, name: &str, value: Value) -> bool {
    match self.shared_fields.borrow_mut().get_mut(name) {
      Some(field) => {
        *field = value;
        true
      },
      None => false,
    }
  }

  pub fn shared_method(&self, name: &str) -> Option<&Arc<CMethod>> {
    self.shared_methods.get(name)
  }

  pub fn method(&self, name: &str) -> Option<&Arc<CMethod>> {
    self.methods.get(name)
  }

  pub fn constructor(&self) -> Option<&Arc<CMethod>> {
    self.methods.get(&constructor_name(&self.name))
  }

  pub fn fields(&self) -> &[String] {
    &self.fields
  }

  pub fn traits(&self) -> &[String] {
    &self.traits
  }

  pub fn shared_init(&self) -> &Arc<CMethod> {
    &self.shared_init
  }

  pub fn instance_init(&self) -> &Arc<CMethod> {
    &self.instance_init
  }

  pub fn init_state(&self) -> InitState {
    self.init.get()
  }

  /// Claim the shared initializer, returning true when it still has to run
  pub fn begin_init(&self) -> bool {
    match self.init.get() {
      InitState::Pending => {
        self.init.set(InitState::Running);
        true
      },
      InitState::Running | InitState::Done => false,
    }
  }

  pub fn finish_init(&self) {
    self.init.set(InitState::Done);
  }

  /// The shared initializer failed, the next `begin_init` runs it again
  pub fn abort_init(&self) {
    self.init.set(InitState::Pending);
  }
}
