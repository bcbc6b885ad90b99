use crate::{
  chunk::CModule,
  constants::is_internal,
  symbol::{ScopeKind, Symbol, SymbolFlags},
  Map,
};

/// Resolves the symbols exported by other modules while
/// a module is being compiled
pub trait ImportResolver {
  /// Resolve a single exported symbol
  fn resolve(&self, module: &str, symbol: &str) -> Option<Symbol>;

  /// Resolve every exported symbol of a module
  fn resolve_symbols(&self, module: &str) -> Option<Vec<Symbol>>;

  /// Does this resolver know about `module`
  fn has_module(&self, module: &str) -> bool {
    self.resolve_symbols(module).is_some()
  }
}

/// A sequence of resolvers, the first resolver that knows a
/// symbol wins
#[derive(Default)]
pub struct ImportResolverChain<'a> {
  resolvers: Vec<&'a dyn ImportResolver>,
}

impl<'a> ImportResolverChain<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a resolver to the end of this chain
  pub fn with(mut self, resolver: &'a dyn ImportResolver) -> Self {
    self.resolvers.push(resolver);
    self
  }
}

impl<'a> ImportResolver for ImportResolverChain<'a> {
  fn resolve(&self, module: &str, symbol: &str) -> Option<Symbol> {
    self
      .resolvers
      .iter()
      .find_map(|resolver| resolver.resolve(module, symbol))
  }

  fn resolve_symbols(&self, module: &str) -> Option<Vec<Symbol>> {
    self
      .resolvers
      .iter()
      .find_map(|resolver| resolver.resolve_symbols(module))
  }
}

/// A resolver that never resolves anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImports;

impl ImportResolver for NoImports {
  fn resolve(&self, _module: &str, _symbol: &str) -> Option<Symbol> {
    None
  }

  fn resolve_symbols(&self, _module: &str) -> Option<Vec<Symbol>> {
    None
  }
}

/// Resolves imports against modules that were already compiled
#[derive(Debug, Default, Clone)]
pub struct ModuleResolver {
  modules: Map<String, Vec<Symbol>>,
}

impl ModuleResolver {
  /// Register the exports of a compiled module
  pub fn add(&mut self, module: &CModule) {
    let symbols = module
      .namespace
      .iter()
      .filter(|entry| !is_internal(&entry.name))
      .map(|entry| {
        Symbol::new(entry.name.clone(), ScopeKind::Module)
          .with_flags(SymbolFlags::from_namespace(entry.flags))
      })
      .collect();

    self.modules.insert(module.name.clone(), symbols);
  }

  /// Register a module by the names it exports
  pub fn add_exports(&mut self, module: &str, exports: &[&str]) {
    let symbols = exports
      .iter()
      .map(|name| Symbol::new(*name, ScopeKind::Module))
      .collect();

    self.modules.insert(module.to_string(), symbols);
  }

  /// Forget a module, returning whether it was registered
  pub fn remove(&mut self, module: &str) -> bool {
    self.modules.remove(module).is_some()
  }
}

impl ImportResolver for ModuleResolver {
  fn resolve(&self, module: &str, symbol: &str) -> Option<Symbol> {
    self
      .modules
      .get(module)
      .and_then(|symbols| symbols.iter().find(|s| s.name() == symbol))
      .cloned()
  }

  fn resolve_symbols(&self, module: &str) -> Option<Vec<Symbol>> {
    self.modules.get(module).cloned()
  }
}
