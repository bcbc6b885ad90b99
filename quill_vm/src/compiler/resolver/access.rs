use super::{finish, PassResult};
use crate::compiler::{
  error::CompileError,
  ir::{
    ast::{Ast, AstKind, Binding, NodeId},
    symbol_table::TableId,
  },
};
use quill_core::{
  constants::{import_field, is_initializer},
  symbol::{ImportBinding, ScopeKind, Symbol},
};

/// Rewrite identifiers into explicit self, class and module accesses
pub fn rewrite(ast: &mut Ast) -> PassResult {
  let root = ast.root();
  let table = match ast.node(root).table {
    Some(table) => table,
    None => return Ok(()),
  };

  let mut pass = Access {
    ast,
    errors: vec![],
    methods: vec![],
  };
  pass.walk(root, table);
  finish(pass.errors)
}

/// What the enclosing method permits
struct MethodContext {
  /// Tables whose locals live in this method's frame
  tables: Vec<TableId>,
  shared: bool,
  initializer: bool,
}

struct Access<'a> {
  ast: &'a mut Ast,
  errors: Vec<CompileError>,
  methods: Vec<MethodContext>,
}

impl<'a> Access<'a> {
  fn walk(&mut self, id: NodeId, scope: TableId) {
    let table = self.ast.node(id).table.unwrap_or(scope);

    match self.ast.kind(id) {
      AstKind::Method { name, shared, .. } => {
        let parent_kind = self
          .ast
          .tables
          .get(table)
          .parent()
          .map(|parent| self.ast.tables.get(parent).kind());
        let nested = !matches!(parent_kind, Some(ScopeKind::Class) | Some(ScopeKind::Module));

        let context = MethodContext {
          tables: vec![table],
          shared: *shared || (nested && self.methods.last().map_or(false, |m| m.shared)),
          initializer: is_initializer(name),
        };

        self.methods.push(context);
        self.children(id, 0, table);
        self.methods.pop();
      },
      AstKind::Block | AstKind::For { .. } | AstKind::Catch { .. } => {
        if let (Some(own), Some(method)) = (self.ast.node(id).table, self.methods.last_mut()) {
          method.tables.push(own);
        }

        // the iterable of a for loop is evaluated outside its scope
        if matches!(self.ast.kind(id), AstKind::For { .. }) {
          self.child(id, 0, scope);
          self.children(id, 1, table);
        } else {
          self.children(id, 0, table);
        }
      },
      AstKind::MethodBind => self.children(id, 1, table),
      AstKind::Assign => {
        if let Some(target) = self.ast.child(id, 0) {
          self.check_assignment(target, table);
        }
        self.children(id, 0, table);
      },
      _ => self.children(id, 0, table),
    }
  }

  fn children(&mut self, id: NodeId, from: usize, table: TableId) {
    for index in from..self.ast.children(id).len() {
      self.child(id, index, table);
    }
  }

  fn child(&mut self, parent: NodeId, index: usize, table: TableId) {
    let child = match self.ast.child(parent, index) {
      Some(child) => child,
      None => return,
    };

    if matches!(self.ast.kind(child), AstKind::Id { binding: None, .. }) {
      self.resolve(parent, index, child, table);
    } else {
      self.walk(child, table);
    }
  }

  fn resolve(&mut self, parent: NodeId, index: usize, id: NodeId, table: TableId) {
    let name = match self.ast.kind(id) {
      AstKind::Id { name, .. } => name.clone(),
      _ => return,
    };
    let span = self.ast.node(id).span;
    let line = self.ast.node(id).line;

    let (found, symbol) = match self.ast.tables.lookup(table, &name) {
      Some((found, symbol)) => (found, symbol.clone()),
      None => {
        let scope = self.ast.tables.get(table).name().to_string();
        self
          .errors
          .push(CompileError::unresolved(&scope, &name, span));
        return;
      },
    };

    match symbol.scope() {
      ScopeKind::Method | ScopeKind::Local => {
        let owned = self
          .methods
          .last()
          .map_or(false, |method| method.tables.contains(&found));

        // locals of an enclosing method are captured by the upvalue pass
        if owned {
          if let (AstKind::Id { binding, .. }, Some(slot)) =
            (&mut self.ast.node_mut(id).kind, symbol.slot())
          {
            *binding = Some(Binding::Local {
              slot,
              boxed: false,
              table: found,
            });
          }
        }
      },
      ScopeKind::Class => {
        let shared_method = self.methods.last().map_or(false, |method| method.shared);

        let receiver = if symbol.is_shared() {
          if symbol.is_method() || shared_method {
            AstKind::SelfRef
          } else {
            AstKind::ClassRef
          }
        } else if shared_method {
          self.errors.push(CompileError::structural(
            format!("Instance member '{name}' cannot be used in a shared method."),
            span,
          ));
          return;
        } else {
          AstKind::SelfRef
        };

        let receiver = self.ast.add(receiver, vec![], line);
        let member = self.member(receiver, &name, id);
        self.ast.replace_child(parent, index, member);
      },
      ScopeKind::Module => {
        let module = self.ast.add(AstKind::ModuleRef, vec![], line);

        let member = match symbol.import() {
          Some(ImportBinding {
            module: origin,
            name: Some(original),
            ..
          }) => {
            let holder = self.member(module, &import_field(origin), id);
            self.member(holder, original, id)
          },
          Some(ImportBinding {
            module: origin,
            name: None,
            ..
          }) => self.member(module, &import_field(origin), id),
          None => self.member(module, &name, id),
        };
        self.ast.replace_child(parent, index, member);
      },
    }
  }

  /// A member access of `name` on `target` positioned at `origin`
  fn member(&mut self, target: NodeId, name: &str, origin: NodeId) -> NodeId {
    let line = self.ast.node(origin).line;
    let span = self.ast.node(origin).span;
    let member = self.ast.add(
      AstKind::Member {
        name: name.to_string(),
      },
      vec![target],
      line,
    );
    self.ast.node_mut(member).span = span;
    member
  }

  fn check_assignment(&mut self, target: NodeId, table: TableId) {
    let name = match self.ast.kind(target) {
      AstKind::Id { name, .. } => name.clone(),
      _ => return,
    };

    let symbol: Symbol = match self.ast.tables.lookup(table, &name) {
      Some((_, symbol)) => symbol.clone(),
      None => return,
    };
    let span = self.ast.node(target).span;

    if symbol.import().is_some() {
      self.errors.push(CompileError::structural(
        format!("Cannot assign to imported '{name}'."),
        span,
      ));
      return;
    }

    if !symbol.is_final() {
      return;
    }

    let initializer = self
      .methods
      .last()
      .map_or(false, |method| method.initializer);
    let field = matches!(symbol.scope(), ScopeKind::Class | ScopeKind::Module);

    if !(field && initializer) {
      self.errors.push(CompileError::structural(
        format!("Cannot assign to final '{name}'."),
        span,
      ));
    }
  }
}
