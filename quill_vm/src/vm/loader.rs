use crate::{
  object::{Class, Module},
  value::Value,
};
use quill_core::{
  chunk::{CMethod, CModule},
  constants::MODULE_INIT,
  Map,
};
use std::{rc::Rc, sync::Arc};

/// Create the runtime module for `module` along with its initializer
pub fn instantiate(module: &CModule) -> (Rc<Module>, Option<Arc<CMethod>>) {
  let methods: Map<String, Arc<CMethod>> = module
    .namespace
    .iter()
    .filter_map(|entry| {
      entry
        .value
        .as_method()
        .map(|method| (entry.name.clone(), Arc::clone(method)))
    })
    .collect();

  let loaded = Rc::new(Module::new(
    module.name.clone(),
    module.constants.clone(),
    methods,
  ));

  for entry in module.namespace.iter() {
    if let Some(class) = entry.value.as_class() {
      let class = Class::new(class, &loaded);
      loaded.define_field(entry.name.clone(), Value::Class(Rc::new(class)));
    } else if entry.value.as_method().is_none() {
      let value = Value::from_constant(&entry.value).unwrap_or(Value::Null);
      loaded.define_field(entry.name.clone(), value);
    }
  }

  let init = loaded.method(MODULE_INIT).cloned();
  (loaded, init)
}
