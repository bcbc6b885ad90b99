use super::{CMethod, Constant, ConstantPool};
use crate::constants::MODULE_INIT;

/// Flags attached to a namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct NamespaceFlags(u8);

impl NamespaceFlags {
  pub const TRAIT: NamespaceFlags = NamespaceFlags(0b01);
  pub const FINAL: NamespaceFlags = NamespaceFlags(0b10);

  const ALL: u8 = 0b11;

  pub fn empty() -> Self {
    Self(0)
  }

  /// Flags from their encoded byte, `None` when unknown bits are set
  pub fn from_bits(bits: u8) -> Option<Self> {
    if bits & !Self::ALL == 0 {
      Some(Self(bits))
    } else {
      None
    }
  }

  pub fn bits(&self) -> u8 {
    self.0
  }

  pub fn with(self, other: NamespaceFlags) -> Self {
    Self(self.0 | other.0)
  }

  pub fn is_trait(&self) -> bool {
    self.0 & Self::TRAIT.0 != 0
  }

  pub fn is_final(&self) -> bool {
    self.0 & Self::FINAL.0 != 0
  }
}

/// A named member of a module or class
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceEntry {
  pub name: String,
  pub flags: NamespaceFlags,
  pub value: Constant,
}

/// The ordered members of a module or of one side of a class
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Namespace {
  entries: Vec<NamespaceEntry>,
}

impl Namespace {
  pub fn new(entries: Vec<NamespaceEntry>) -> Self {
    Self { entries }
  }

  /// Add an entry replacing any previous entry of the same name
  pub fn insert(&mut self, name: impl Into<String>, flags: NamespaceFlags, value: Constant) {
    let name = name.into();
    match self.entries.iter_mut().find(|entry| entry.name == name) {
      Some(entry) => {
        entry.flags = flags;
        entry.value = value;
      },
      None => self.entries.push(NamespaceEntry { name, flags, value }),
    }
  }

  pub fn get(&self, name: &str) -> Option<&NamespaceEntry> {
    self.entries.iter().find(|entry| entry.name == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &NamespaceEntry> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// A compiled class
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CClass {
  pub name: String,

  /// Initializer for the shared fields, run once
  pub shared_init: CMethod,

  /// Shared fields and methods
  pub shared: Namespace,

  /// Initializer for instance fields, run on each construction
  pub instance_init: CMethod,

  /// Instance fields and methods
  pub instance: Namespace,
}

impl CClass {
  /// The instance fields this class delegates to
  pub fn traits(&self) -> Vec<&str> {
    self
      .instance
      .iter()
      .filter(|entry| entry.flags.is_trait() && entry.value.as_method().is_none())
      .map(|entry| entry.name.as_str())
      .collect()
  }
}

/// An import of another module
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Import {
  /// The imported module
  pub module: String,

  /// Were all exported symbols imported
  pub all: bool,

  /// The imported symbol names
  pub symbols: Vec<String>,

  /// Local names parallel to `symbols`, empty when not aliased
  pub aliases: Vec<String>,
}

/// A compiled module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CModule {
  pub name: String,
  pub constants: ConstantPool,
  pub imports: Vec<Import>,
  pub namespace: Namespace,
}

impl CModule {
  /// The module initializer
  pub fn init(&self) -> Option<&CMethod> {
    self
      .namespace
      .get(MODULE_INIT)
      .and_then(|entry| entry.value.as_method())
      .map(|method| &**method)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn flags() {
    let flags = NamespaceFlags::FINAL.with(NamespaceFlags::TRAIT);
    assert_eq!(flags.bits(), 0b11);
    assert!(flags.is_final());
    assert!(flags.is_trait());
    assert!(!NamespaceFlags::empty().is_final());
    assert_eq!(NamespaceFlags::from_bits(0b100), None);
  }

  #[test]
  fn namespace_insert_replaces() {
    let mut namespace = Namespace::default();
    namespace.insert("x", NamespaceFlags::empty(), Constant::Null);
    namespace.insert("y", NamespaceFlags::empty(), Constant::Null);
    namespace.insert("x", NamespaceFlags::FINAL, Constant::Int(1));

    assert_eq!(namespace.len(), 2);
    let entry = namespace.get("x").expect("missing x");
    assert!(entry.flags.is_final());
    assert_eq!(entry.value, Constant::Int(1));
  }

  #[test]
  fn class_traits() {
    let mut class = CClass {
      name: "Foo".to_string(),
      ..Default::default()
    };
    class
      .instance
      .insert("delegate", NamespaceFlags::TRAIT, Constant::Null);
    class
      .instance
      .insert("plain", NamespaceFlags::empty(), Constant::Null);

    assert_eq!(class.traits(), vec!["delegate"]);
  }
}
