use super::{finish, PassResult};
use crate::compiler::{
  error::CompileError,
  ir::{
    ast::{Ast, AstKind, Binding, Capture, CaptureSource, NodeId},
    symbol_table::TableId,
  },
};
use quill_core::symbol::{ScopeKind, Symbol, SymbolFlags};

/// Resolve references to locals of enclosing methods into captures,
/// then mark every local read whose slot holds a box
pub fn capture(ast: &mut Ast) -> PassResult {
  let root = ast.root();
  let table = match ast.node(root).table {
    Some(table) => table,
    None => return Ok(()),
  };

  let mut pass = Upvalues {
    ast,
    errors: vec![],
    methods: vec![],
  };
  pass.walk(root, table);
  let errors = pass.errors;

  mark_boxed(ast);
  finish(errors)
}

struct MethodFrame {
  node: NodeId,
  table: TableId,
  tables: Vec<TableId>,
}

struct Upvalues<'a> {
  ast: &'a mut Ast,
  errors: Vec<CompileError>,
  methods: Vec<MethodFrame>,
}

impl<'a> Upvalues<'a> {
  fn walk(&mut self, id: NodeId, scope: TableId) {
    let table = self.ast.node(id).table.unwrap_or(scope);

    match self.ast.kind(id) {
      AstKind::Method { .. } => {
        self.methods.push(MethodFrame {
          node: id,
          table,
          tables: vec![table],
        });
        self.children(id, 0, table);
        self.methods.pop();
      },
      AstKind::Block | AstKind::Catch { .. } => {
        self.own(id);
        self.children(id, 0, table);
      },
      AstKind::For { .. } => {
        self.own(id);
        if let Some(iterable) = self.ast.child(id, 0) {
          self.walk(iterable, scope);
        }
        self.children(id, 1, table);
      },
      AstKind::MethodBind => self.children(id, 1, table),
      AstKind::Id { binding: None, .. } => self.capture(id, table),
      _ => self.children(id, 0, table),
    }
  }

  fn own(&mut self, id: NodeId) {
    if let (Some(table), Some(method)) = (self.ast.node(id).table, self.methods.last_mut()) {
      method.tables.push(table);
    }
  }

  fn children(&mut self, id: NodeId, from: usize, table: TableId) {
    for index in from..self.ast.children(id).len() {
      if let Some(child) = self.ast.child(id, index) {
        self.walk(child, table);
      }
    }
  }

  fn capture(&mut self, id: NodeId, table: TableId) {
    let name = match self.ast.kind(id) {
      AstKind::Id { name, .. } => name.clone(),
      _ => return,
    };
    let span = self.ast.node(id).span;

    let (found, slot) = match self.ast.tables.lookup(table, &name) {
      Some((found, symbol)) => (found, symbol.slot()),
      None => {
        self.errors.push(CompileError::unresolved(
          self.ast.tables.get(table).name(),
          &name,
          span,
        ));
        return;
      },
    };

    let declaring = self
      .methods
      .iter()
      .rposition(|method| method.tables.contains(&found));

    let (depth, slot) = match (declaring, slot) {
      (Some(depth), Some(slot)) if depth + 1 < self.methods.len() => (depth, slot),
      _ => {
        self.errors.push(CompileError::structural(
          format!("'{name}' cannot be captured here."),
          span,
        ));
        return;
      },
    };

    self.mark_declaration(found, &name);

    let mut source = CaptureSource::Local(slot);
    let mut index = 0;
    for level in depth + 1..self.methods.len() {
      index = self.add_capture(level, &name, source);
      source = CaptureSource::Enclosing(index);
    }

    if let AstKind::Id { binding, .. } = &mut self.ast.node_mut(id).kind {
      *binding = Some(Binding::Capture { index });
    }
  }

  fn mark_declaration(&mut self, table: TableId, name: &str) {
    let declaring = self.ast.tables.get_mut(table);
    if let Some(symbol) = declaring.get_mut(name) {
      symbol.mark_upvalue();
    }

    if let Some(declaration) = declaring.declaration(name) {
      if let Some(symbol) = &mut self.ast.node_mut(declaration).symbol {
        symbol.mark_upvalue();
      }
    }
  }

  /// Add a capture of `name` to the method at `level` returning its index
  fn add_capture(&mut self, level: usize, name: &str, source: CaptureSource) -> u32 {
    let (node, table) = (self.methods[level].node, self.methods[level].table);

    let index = match &mut self.ast.node_mut(node).kind {
      AstKind::Method { captures, .. } => {
        match captures
          .iter()
          .position(|capture| capture.name == name && capture.source == source)
        {
          Some(index) => return index as u32,
          None => {
            captures.push(Capture {
              name: name.to_string(),
              source,
            });
            (captures.len() - 1) as u32
          },
        }
      },
      _ => 0,
    };

    self.ast.tables.get_mut(table).add_capture(
      Symbol::new(name, ScopeKind::Method)
        .with_flags(SymbolFlags::UPVALUE)
        .with_slot(index),
    );
    index
  }
}

/// Flag local reads of slots that were boxed for capture
fn mark_boxed(ast: &mut Ast) {
  for id in ast.ids().collect::<Vec<NodeId>>() {
    let (name, table) = match ast.kind(id) {
      AstKind::Id {
        name,
        binding: Some(Binding::Local { table, .. }),
      } => (name.clone(), *table),
      _ => continue,
    };

    let upvalue = ast
      .tables
      .get(table)
      .get(&name)
      .map_or(false, |symbol| symbol.is_upvalue());

    if let AstKind::Id {
      binding: Some(Binding::Local { boxed, .. }),
      ..
    } = &mut ast.node_mut(id).kind
    {
      *boxed = upvalue;
    }
  }
}
