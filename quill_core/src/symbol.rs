use crate::chunk::NamespaceFlags;
use std::fmt;

/// The kind of scope a symbol was declared in
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ScopeKind {
  Module,
  Class,
  Method,
  Local,
}

impl fmt::Display for ScopeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScopeKind::Module => write!(f, "module"),
      ScopeKind::Class => write!(f, "class"),
      ScopeKind::Method => write!(f, "method"),
      ScopeKind::Local => write!(f, "local"),
    }
  }
}

/// Modifiers attached to a symbol
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SymbolFlags(u8);

impl SymbolFlags {
  pub const FINAL: SymbolFlags = SymbolFlags(0b0001);
  pub const SHARED: SymbolFlags = SymbolFlags(0b0010);
  pub const TRAIT: SymbolFlags = SymbolFlags(0b0100);
  pub const UPVALUE: SymbolFlags = SymbolFlags(0b1000);
  /// The symbol names a method rather than a field
  pub const METHOD: SymbolFlags = SymbolFlags(0b1_0000);

  pub fn empty() -> Self {
    Self(0)
  }

  pub fn with(self, other: SymbolFlags) -> Self {
    Self(self.0 | other.0)
  }

  pub fn contains(&self, other: SymbolFlags) -> bool {
    self.0 & other.0 == other.0
  }

  /// The flags persisted with a namespace entry
  pub fn namespace_flags(&self) -> NamespaceFlags {
    let mut flags = NamespaceFlags::empty();
    if self.contains(Self::TRAIT) {
      flags = flags.with(NamespaceFlags::TRAIT);
    }
    if self.contains(Self::FINAL) {
      flags = flags.with(NamespaceFlags::FINAL);
    }
    flags
  }

  /// Flags for a symbol imported from a namespace entry
  pub fn from_namespace(flags: NamespaceFlags) -> Self {
    let mut result = Self::empty();
    if flags.is_trait() {
      result = result.with(Self::TRAIT);
    }
    if flags.is_final() {
      result = result.with(Self::FINAL);
    }
    result
  }
}

/// Where an imported symbol came from
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ImportBinding {
  /// The module the symbol was imported from
  pub module: String,

  /// The name in the origin module, `None` when the module itself is bound
  pub name: Option<String>,

  /// The local alias if one was given
  pub alias: Option<String>,
}

/// A symbol representing a named
/// entity inside a Quill program
#[derive(Debug, PartialEq, Clone)]
pub struct Symbol {
  /// name of the symbol
  name: String,

  /// The kind of scope this symbol was declared in
  scope: ScopeKind,

  /// Modifiers of this symbol
  flags: SymbolFlags,

  /// Provenance if this symbol was imported
  import: Option<ImportBinding>,

  /// Local slot or capture index
  slot: Option<u32>,
}

impl Symbol {
  pub fn new(name: impl Into<String>, scope: ScopeKind) -> Self {
    Self {
      name: name.into(),
      scope,
      flags: SymbolFlags::empty(),
      import: None,
      slot: None,
    }
  }

  pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn with_slot(mut self, slot: u32) -> Self {
    self.slot = Some(slot);
    self
  }

  pub fn with_import(mut self, import: ImportBinding) -> Self {
    self.import = Some(import);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn scope(&self) -> ScopeKind {
    self.scope
  }

  pub fn flags(&self) -> SymbolFlags {
    self.flags
  }

  pub fn slot(&self) -> Option<u32> {
    self.slot
  }

  pub fn import(&self) -> Option<&ImportBinding> {
    self.import.as_ref()
  }

  pub fn is_final(&self) -> bool {
    self.flags.contains(SymbolFlags::FINAL)
  }

  pub fn is_shared(&self) -> bool {
    self.flags.contains(SymbolFlags::SHARED)
  }

  pub fn is_trait(&self) -> bool {
    self.flags.contains(SymbolFlags::TRAIT)
  }

  pub fn is_upvalue(&self) -> bool {
    self.flags.contains(SymbolFlags::UPVALUE)
  }

  pub fn is_method(&self) -> bool {
    self.flags.contains(SymbolFlags::METHOD)
  }

  /// Rename this symbol
  pub fn rename(&mut self, name: impl Into<String>) {
    self.name = name.into();
  }

  /// Mark this symbol as captured by a nested method
  pub fn mark_upvalue(&mut self) {
    assert!(matches!(self.scope, ScopeKind::Method | ScopeKind::Local));
    self.flags = self.flags.with(SymbolFlags::UPVALUE);
  }
}
