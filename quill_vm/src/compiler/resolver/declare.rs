use super::{finish, PassResult};
use crate::compiler::{
  error::CompileError,
  ir::{
    ast::{Ast, AstKind, NodeId},
    symbol_table::{AddSymbolResult, TableId},
  },
};
use quill_core::{
  constants::LAMBDA,
  symbol::{ScopeKind, Symbol, SymbolFlags},
};

/// Build the symbol tables of a module and assign local slots
pub fn declare(ast: &mut Ast) -> PassResult {
  let mut pass = Declare {
    ast,
    errors: vec![],
    slots: vec![],
  };

  let root = pass.ast.root();
  pass.module(root);
  finish(pass.errors)
}

struct Declare<'a> {
  ast: &'a mut Ast,
  errors: Vec<CompileError>,

  /// The next free slot of each enclosing method, the module
  /// initializer at the bottom
  slots: Vec<u32>,
}

impl<'a> Declare<'a> {
  fn module(&mut self, id: NodeId) {
    let name = match self.ast.kind(id) {
      AstKind::Module { name, .. } => name.clone(),
      _ => {
        self.structural(id, "The root of a tree must be a module.");
        return;
      },
    };

    let table = self.ast.tables.push(ScopeKind::Module, None, name);
    self.ast.node_mut(id).table = Some(table);

    self.slots.push(0);
    self.children(id, table);
    let count = self.slots.pop().unwrap_or_default();

    if let AstKind::Module { locals, .. } = &mut self.ast.node_mut(id).kind {
      *locals = count;
    }
  }

  fn node(&mut self, id: NodeId, scope: TableId) {
    match self.ast.kind(id).clone() {
      AstKind::Module { .. } => self.structural(id, "Modules cannot be nested."),
      AstKind::Class { name } => self.class(id, &name, scope),
      AstKind::Method { name, shared, .. } => self.method(id, &name, shared, scope),
      AstKind::Param { .. } => self.structural(id, "Parameters may only appear in a method."),
      AstKind::Block => {
        let table = self.local_table(id, scope);
        self.children(id, table);
      },
      AstKind::VarDec { name, flags } => {
        self.children(id, scope);
        self.variable(id, &name, flags, scope);
      },
      AstKind::For { name, .. } => {
        let children = self.ast.children(id).to_vec();
        if let Some(iterable) = children.first() {
          self.node(*iterable, scope);
        }

        let table = self.local_table(id, scope);
        let iterator = self.next_slot();
        if let AstKind::For { iterator: slot, .. } = &mut self.ast.node_mut(id).kind {
          *slot = iterator;
        }
        self.declare_in(table, id, &name, SymbolFlags::empty());

        for child in children.iter().skip(1) {
          self.node(*child, table);
        }
      },
      AstKind::Catch { name } => {
        let table = self.local_table(id, scope);
        self.declare_in(table, id, &name, SymbolFlags::empty());
        self.children(id, table);
      },
      AstKind::Import { .. } => {
        if self.ast.tables.get(scope).kind() != ScopeKind::Module {
          self.structural(id, "Imports may only appear at the module level.");
        }
      },
      _ => self.children(id, scope),
    }
  }

  fn children(&mut self, id: NodeId, scope: TableId) {
    for child in self.ast.children(id).to_vec() {
      self.node(child, scope);
    }
  }

  fn class(&mut self, id: NodeId, name: &str, scope: TableId) {
    if self.ast.tables.get(scope).kind() != ScopeKind::Module {
      self.structural(id, "Classes may only be declared at the module level.");
      return;
    }

    self.declare_in(scope, id, name, SymbolFlags::empty());
    let qualified = format!("{}.{}", self.ast.tables.get(scope).name(), name);
    let table = self
      .ast
      .tables
      .push(ScopeKind::Class, Some(scope), qualified);
    self.ast.node_mut(id).table = Some(table);

    for child in self.ast.children(id).to_vec() {
      match self.ast.kind(child) {
        AstKind::VarDec { .. } | AstKind::Method { .. } => self.node(child, table),
        _ => self.structural(child, "A class body may only contain fields and methods."),
      }
    }
  }

  fn method(&mut self, id: NodeId, name: &str, shared: bool, scope: TableId) {
    let scope_kind = self.ast.tables.get(scope).kind();
    if shared && scope_kind != ScopeKind::Class {
      self.structural(id, "Only class members may be shared.");
    }

    if name != LAMBDA {
      let flags = if shared {
        SymbolFlags::METHOD.with(SymbolFlags::SHARED)
      } else {
        SymbolFlags::METHOD
      };
      self.declare_in(scope, id, name, flags);
    }

    let qualified = format!("{}.{}", self.ast.tables.get(scope).name(), name);
    let table = self
      .ast
      .tables
      .push(ScopeKind::Method, Some(scope), qualified);
    self.ast.node_mut(id).table = Some(table);

    self.slots.push(0);
    let children = self.ast.children(id).to_vec();
    if let Some((body, params)) = children.split_last() {
      for param in params {
        match self.ast.kind(*param).clone() {
          AstKind::Param { name } => {
            self.children(*param, table);
            self.declare_in(table, *param, &name, SymbolFlags::empty());
          },
          _ => self.structural(*param, "Expected a parameter."),
        }
      }
      self.node(*body, table);
    }
    let count = self.slots.pop().unwrap_or_default();

    if let AstKind::Method { locals, .. } = &mut self.ast.node_mut(id).kind {
      *locals = count;
    }
  }

  fn variable(&mut self, id: NodeId, name: &str, flags: SymbolFlags, scope: TableId) {
    let scope_kind = self.ast.tables.get(scope).kind();
    if scope_kind != ScopeKind::Class
      && (flags.contains(SymbolFlags::SHARED) || flags.contains(SymbolFlags::TRAIT))
    {
      self.structural(id, "Only class members may be shared or traits.");
    }

    self.declare_in(scope, id, name, flags);
  }

  fn local_table(&mut self, id: NodeId, scope: TableId) -> TableId {
    let name = self.ast.tables.get(scope).name().to_string();
    let table = self.ast.tables.push(ScopeKind::Local, Some(scope), name);
    self.ast.node_mut(id).table = Some(table);
    table
  }

  /// Declare `name` in `scope`, locals receive the next free slot
  fn declare_in(&mut self, scope: TableId, id: NodeId, name: &str, flags: SymbolFlags) {
    let kind = self.ast.tables.get(scope).kind();
    let symbol = match kind {
      ScopeKind::Module | ScopeKind::Class => Symbol::new(name, kind).with_flags(flags),
      ScopeKind::Method | ScopeKind::Local => Symbol::new(name, kind)
        .with_flags(flags)
        .with_slot(self.next_slot()),
    };

    self.ast.node_mut(id).symbol = Some(symbol.clone());
    if self.ast.tables.get_mut(scope).add_symbol(symbol, Some(id)) == AddSymbolResult::DuplicateSymbol
    {
      let span = self.ast.node(id).span;
      self.errors.push(CompileError::duplicate(name, span));
    }
  }

  fn next_slot(&mut self) -> u32 {
    match self.slots.last_mut() {
      Some(next) => {
        let slot = *next;
        *next += 1;
        slot
      },
      None => 0,
    }
  }

  fn structural(&mut self, id: NodeId, message: &str) {
    let span = self.ast.node(id).span;
    self.errors.push(CompileError::structural(message, span));
  }
}
