use super::ast::NodeId;
use quill_core::{
  symbol::{ScopeKind, Symbol},
  Map,
};

/// Index of a table inside [`SymbolTables`]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct TableId(u32);

impl TableId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Was the symbol successfully added
/// to this table
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AddSymbolResult {
  Ok,
  DuplicateSymbol,
}

/// A table representing a collection of symbols
/// for a particular scope
#[derive(Debug, Clone)]
pub struct SymbolTable {
  /// The kind of scope this table belongs to
  kind: ScopeKind,

  /// The enclosing scope
  parent: Option<TableId>,

  /// A dotted name identifying this scope in diagnostics
  name: String,

  /// Symbols declared directly in this scope
  symbols: Map<String, Symbol>,

  /// The node that declared each symbol
  declarations: Map<String, NodeId>,

  /// Upvalue references installed for captured outer locals
  captures: Vec<Symbol>,
}

impl SymbolTable {
  fn new(kind: ScopeKind, parent: Option<TableId>, name: String) -> Self {
    Self {
      kind,
      parent,
      name,
      symbols: Map::default(),
      declarations: Map::default(),
      captures: vec![],
    }
  }

  pub fn kind(&self) -> ScopeKind {
    self.kind
  }

  pub fn parent(&self) -> Option<TableId> {
    self.parent
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Add a new symbol to this table
  pub fn add_symbol(&mut self, symbol: Symbol, declaration: Option<NodeId>) -> AddSymbolResult {
    if self.symbols.contains_key(symbol.name()) {
      return AddSymbolResult::DuplicateSymbol;
    }

    if let Some(declaration) = declaration {
      self
        .declarations
        .insert(symbol.name().to_string(), declaration);
    }
    self.symbols.insert(symbol.name().to_string(), symbol);
    AddSymbolResult::Ok
  }

  /// Retrieve a symbol from this table if it
  /// exists
  pub fn get(&self, name: &str) -> Option<&Symbol> {
    self.symbols.get(name)
  }

  /// Retrieve a symbol from this table if it
  /// exists that allows modification
  pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
    self.symbols.get_mut(name)
  }

  /// The node that declared `name`
  pub fn declaration(&self, name: &str) -> Option<NodeId> {
    self.declarations.get(name).copied()
  }

  /// Rename a symbol keeping its declaration
  pub fn rename(&mut self, from: &str, to: &str) -> bool {
    if self.symbols.contains_key(to) {
      return false;
    }

    match self.symbols.remove(from) {
      Some(mut symbol) => {
        symbol.rename(to);
        self.symbols.insert(to.to_string(), symbol);
        if let Some(declaration) = self.declarations.remove(from) {
          self.declarations.insert(to.to_string(), declaration);
        }
        true
      },
      None => false,
    }
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
    self.symbols.values()
  }

  pub fn add_capture(&mut self, symbol: Symbol) {
    self.captures.push(symbol);
  }

  pub fn captures(&self) -> &[Symbol] {
    &self.captures
  }
}

/// Every symbol table of a module, linked to their parents by index
#[derive(Debug, Default, Clone)]
pub struct SymbolTables {
  tables: Vec<SymbolTable>,
}

impl SymbolTables {
  /// Create a new table nested in `parent`
  pub fn push(&mut self, kind: ScopeKind, parent: Option<TableId>, name: impl Into<String>) -> TableId {
    let id = TableId(self.tables.len() as u32);
    self.tables.push(SymbolTable::new(kind, parent, name.into()));
    id
  }

  pub fn get(&self, id: TableId) -> &SymbolTable {
    &self.tables[id.index()]
  }

  pub fn get_mut(&mut self, id: TableId) -> &mut SymbolTable {
    &mut self.tables[id.index()]
  }

  pub fn len(&self) -> usize {
    self.tables.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tables.is_empty()
  }

  /// Find `name` starting at `from` and walking out through the parents
  pub fn lookup(&self, from: TableId, name: &str) -> Option<(TableId, &Symbol)> {
    let mut current = Some(from);

    while let Some(id) = current {
      let table = self.get(id);
      if let Some(symbol) = table.get(name) {
        return Some((id, symbol));
      }
      current = table.parent();
    }

    None
  }

  /// The closest table of `kind` at or above `from`
  pub fn enclosing(&self, from: TableId, kind: ScopeKind) -> Option<TableId> {
    let mut current = Some(from);

    while let Some(id) = current {
      let table = self.get(id);
      if table.kind() == kind {
        return Some(id);
      }
      current = table.parent();
    }

    None
  }
}
