use crate::{
  fiber::StepResult,
  natives,
  object::{Module, NativeFn, NativeFunction},
  value::Value,
  vm::Vm,
};
use quill_core::{
  chunk::ConstantPool,
  import::ImportResolver,
  symbol::{ScopeKind, Symbol},
  Map, Set,
};
use quill_env::io::Io;
use std::rc::Rc;

/// A module implemented by the host
#[derive(Debug, Clone)]
pub struct NativeModule {
  name: String,
  functions: Vec<Rc<NativeFunction>>,
}

impl NativeModule {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      functions: vec![],
    }
  }

  /// Add a function, `None` accepts any number of arguments
  pub fn with_function(
    mut self,
    name: &str,
    arity: Option<usize>,
    fun: impl Fn(&mut Vm, &[Value]) -> StepResult + 'static,
  ) -> Self {
    let fun: NativeFn = Rc::new(fun);
    self
      .functions
      .push(Rc::new(NativeFunction::new(name, arity, fun)));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn exports(&self, name: &str) -> bool {
    self.functions.iter().any(|function| function.name() == name)
  }

  /// A runtime module whose fields are this module's functions
  pub fn instantiate(&self) -> Module {
    let module = Module::new(self.name.clone(), ConstantPool::default(), Map::default());
    for function in &self.functions {
      module.define_field(function.name(), Value::Native(Rc::clone(function)));
    }
    module
  }

  fn symbols(&self) -> Vec<Symbol> {
    self
      .functions
      .iter()
      .map(|function| Symbol::new(function.name(), ScopeKind::Module))
      .collect()
  }
}

/// Which native modules scripts may link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPolicy {
  #[default]
  AllowAll,
  AllowList(Set<String>),
  DenyAll,
}

impl LinkPolicy {
  /// Allow only the named modules
  pub fn allow_only(modules: &[&str]) -> Self {
    LinkPolicy::AllowList(modules.iter().map(|module| module.to_string()).collect())
  }

  pub fn allows(&self, module: &str) -> bool {
    match self {
      LinkPolicy::AllowAll => true,
      LinkPolicy::AllowList(allowed) => allowed.contains(module),
      LinkPolicy::DenyAll => false,
    }
  }
}

/// Everything a vm receives from its host: io, the native modules it
/// may link and the policy deciding which of them scripts can import
#[derive(Debug)]
pub struct Environment {
  io: Io,
  natives: Map<String, NativeModule>,
  policy: LinkPolicy,
}

impl Environment {
  pub fn new(io: Io) -> Self {
    Self {
      io,
      natives: Map::default(),
      policy: LinkPolicy::default(),
    }
  }

  /// An environment providing the standard native modules
  pub fn standard(io: Io) -> Self {
    Self::new(io).with_native_module(natives::std_module())
  }

  pub fn with_native_module(mut self, module: NativeModule) -> Self {
    self.natives.insert(module.name().to_string(), module);
    self
  }

  pub fn with_policy(mut self, policy: LinkPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn io(&self) -> &Io {
    &self.io
  }

  pub fn policy(&self) -> &LinkPolicy {
    &self.policy
  }

  /// A registered native module whether or not the policy allows it
  pub fn native_module(&self, name: &str) -> Option<&NativeModule> {
    self.natives.get(name)
  }

  fn linkable(&self, name: &str) -> Option<&NativeModule> {
    self
      .native_module(name)
      .filter(|_| self.policy.allows(name))
  }
}

impl ImportResolver for Environment {
  fn resolve(&self, module: &str, symbol: &str) -> Option<Symbol> {
    self
      .linkable(module)
      .filter(|native| native.exports(symbol))
      .map(|_| Symbol::new(symbol, ScopeKind::Module))
  }

  fn resolve_symbols(&self, module: &str) -> Option<Vec<Symbol>> {
    self.linkable(module).map(NativeModule::symbols)
  }
}
