use super::symbol_table::{SymbolTables, TableId};
use quill_core::{
  chunk::Constant,
  constants::LAMBDA,
  symbol::{Symbol, SymbolFlags},
};
use std::ops::Range;

/// Index of a node inside an [`Ast`]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// A source range of a node
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Span {
  pub start: u32,
  pub end: u32,
}

impl Span {
  pub fn new(start: u32, end: u32) -> Self {
    Self { start, end }
  }
}

impl From<Span> for Range<usize> {
  fn from(span: Span) -> Self {
    (span.start as usize)..(span.end as usize)
  }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulo,
  Equal,
  NotEqual,
  Less,
  LessEqual,
  Greater,
  GreaterEqual,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
  Negate,
  Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogicalOp {
  And,
  Or,
}

/// How an identifier is read after resolution
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Binding {
  /// A slot of the current frame, boxed when captured
  Local {
    slot: u32,
    boxed: bool,
    table: TableId,
  },

  /// A capture of the current closure
  Capture { index: u32 },
}

/// Where a closure finds a captured value when it is created
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CaptureSource {
  /// A boxed local slot of the enclosing method
  Local(u32),

  /// A capture of the enclosing closure
  Enclosing(u32),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Capture {
  pub name: String,
  pub source: CaptureSource,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ImportSymbol {
  pub name: String,
  pub alias: Option<String>,
}

/// The kind of an ast node. Children are stored on the node itself,
/// the comment on each variant lists their layout.
#[derive(Debug, PartialEq, Clone)]
pub enum AstKind {
  /// `[declarations and statements..]`
  Module { name: String, locals: u32 },

  /// `[fields and methods..]`
  Class { name: String },

  /// `[params.., body]`, the body is a block or a single expression for lambdas
  Method {
    name: String,
    shared: bool,
    lambda: bool,
    locals: u32,
    captures: Vec<Capture>,
  },

  /// `[default?]`
  Param { name: String },

  /// `[statements..]`
  Block,

  /// `[initializer?]`
  VarDec { name: String, flags: SymbolFlags },

  Import {
    module: String,
    alias: Option<String>,
    symbols: Vec<ImportSymbol>,
    all: bool,
  },

  Id {
    name: String,
    binding: Option<Binding>,
  },

  SelfRef,
  ClassRef,
  ModuleRef,

  /// `[target]`
  Member { name: String },

  Literal(Constant),

  /// `[elements..]`
  List,

  /// `[left, right]`
  Binary(BinaryOp),

  /// `[operand]`
  Unary(UnaryOp),

  /// `[left, right]`
  Logical(LogicalOp),

  /// `[target, value]`
  Assign,

  /// `[callee, args..]`
  Call,

  /// `[method id, receiver]`
  MethodBind,

  /// `[cond, then, (cond, then).., else?]`
  If,

  /// `[cond, body]`
  While,

  /// `[iterable, body]`
  For { name: String, iterator: u32 },

  Break,
  Continue,

  /// `[value?]`
  Return,

  /// `[value]`
  Throw,

  /// `[body, catch]`
  Try,

  /// `[body]`
  Catch { name: String },

  /// `[expression]`
  ExprStmt,

  /// Load an imported module
  ImportModule { module: String },

  /// `[class]`
  InitClass { name: String },
}

impl AstKind {
  /// The declared name of this node if it declares one
  pub fn declared_name(&self) -> Option<&str> {
    match self {
      AstKind::Module { name, .. }
      | AstKind::Class { name }
      | AstKind::Param { name }
      | AstKind::VarDec { name, .. }
      | AstKind::For { name, .. }
      | AstKind::Catch { name } => Some(name),
      AstKind::Method { name, .. } if name != LAMBDA => Some(name),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct AstNode {
  pub kind: AstKind,
  pub children: Vec<NodeId>,

  /// The symbol this node declares
  pub symbol: Option<Symbol>,

  /// The scope this node opens
  pub table: Option<TableId>,

  pub span: Span,
  pub line: u32,
}

/// An arena of ast nodes rooted at a module
#[derive(Debug, Clone)]
pub struct Ast {
  nodes: Vec<AstNode>,
  root: NodeId,
  pub tables: SymbolTables,
}

impl Ast {
  pub fn root(&self) -> NodeId {
    self.root
  }

  /// The name of the module at the root
  pub fn name(&self) -> &str {
    match self.kind(self.root) {
      AstKind::Module { name, .. } => name,
      _ => "",
    }
  }

  pub fn node(&self, id: NodeId) -> &AstNode {
    &self.nodes[id.index()]
  }

  pub fn node_mut(&mut self, id: NodeId) -> &mut AstNode {
    &mut self.nodes[id.index()]
  }

  pub fn kind(&self, id: NodeId) -> &AstKind {
    &self.nodes[id.index()].kind
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id.index()].children
  }

  pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
    self.nodes[id.index()].children.get(index).copied()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Add a detached node at `line`
  pub fn add(&mut self, kind: AstKind, children: Vec<NodeId>, line: u32) -> NodeId {
    push_node(&mut self.nodes, kind, children, line, Span::default())
  }

  pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
    self.nodes[parent.index()].children.push(child);
  }

  pub fn replace_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
    self.nodes[parent.index()].children[index] = child;
  }

  /// Every node in the arena including detached ones
  pub fn ids(&self) -> impl Iterator<Item = NodeId> {
    (0..self.nodes.len() as u32).map(NodeId)
  }
}

fn push_node(
  nodes: &mut Vec<AstNode>,
  kind: AstKind,
  children: Vec<NodeId>,
  line: u32,
  span: Span,
) -> NodeId {
  let id = NodeId(nodes.len() as u32);
  nodes.push(AstNode {
    kind,
    children,
    symbol: None,
    table: None,
    span,
    line,
  });
  id
}

/// Builds an [`Ast`] bottom up. Nodes record the line and span
/// most recently set with [`AstBuilder::at`] and [`AstBuilder::span`].
#[derive(Debug, Default)]
pub struct AstBuilder {
  nodes: Vec<AstNode>,
  line: u32,
  span: Span,
}

impl AstBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the source line of subsequent nodes
  pub fn at(&mut self, line: u32) -> &mut Self {
    self.line = line;
    self
  }

  /// Set the source span of subsequent nodes
  pub fn span(&mut self, start: u32, end: u32) -> &mut Self {
    self.span = Span::new(start, end);
    self
  }

  pub fn node(&mut self, kind: AstKind, children: Vec<NodeId>) -> NodeId {
    push_node(&mut self.nodes, kind, children, self.line, self.span)
  }

  /// Finish the tree with a module root
  pub fn module(mut self, name: &str, items: Vec<NodeId>) -> Ast {
    let root = self.node(
      AstKind::Module {
        name: name.to_string(),
        locals: 0,
      },
      items,
    );

    Ast {
      nodes: self.nodes,
      root,
      tables: SymbolTables::default(),
    }
  }

  pub fn class(&mut self, name: &str, members: Vec<NodeId>) -> NodeId {
    self.node(
      AstKind::Class {
        name: name.to_string(),
      },
      members,
    )
  }

  fn method_node(
    &mut self,
    name: &str,
    shared: bool,
    lambda: bool,
    mut params: Vec<NodeId>,
    body: NodeId,
  ) -> NodeId {
    params.push(body);
    self.node(
      AstKind::Method {
        name: name.to_string(),
        shared,
        lambda,
        locals: 0,
        captures: vec![],
      },
      params,
    )
  }

  pub fn method(&mut self, name: &str, params: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
    let body = self.block(body);
    self.method_node(name, false, false, params, body)
  }

  pub fn shared_method(&mut self, name: &str, params: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
    let body = self.block(body);
    self.method_node(name, true, false, params, body)
  }

  /// An anonymous method whose body is a single expression
  pub fn lambda(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
    self.method_node(LAMBDA, false, true, params, body)
  }

  /// An anonymous method with a block body
  pub fn anonymous(&mut self, params: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
    let body = self.block(body);
    self.method_node(LAMBDA, false, false, params, body)
  }

  pub fn param(&mut self, name: &str) -> NodeId {
    self.node(
      AstKind::Param {
        name: name.to_string(),
      },
      vec![],
    )
  }

  pub fn param_default(&mut self, name: &str, default: NodeId) -> NodeId {
    self.node(
      AstKind::Param {
        name: name.to_string(),
      },
      vec![default],
    )
  }

  pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
    self.node(AstKind::Block, statements)
  }

  pub fn declare(&mut self, name: &str, flags: SymbolFlags, init: Option<NodeId>) -> NodeId {
    self.node(
      AstKind::VarDec {
        name: name.to_string(),
        flags,
      },
      init.into_iter().collect(),
    )
  }

  pub fn var(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
    self.declare(name, SymbolFlags::empty(), init)
  }

  pub fn final_var(&mut self, name: &str, init: NodeId) -> NodeId {
    self.declare(name, SymbolFlags::FINAL, Some(init))
  }

  pub fn shared_var(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
    self.declare(name, SymbolFlags::SHARED, init)
  }

  /// Import the given symbols, each with an optional alias
  pub fn import(&mut self, module: &str, symbols: &[(&str, Option<&str>)]) -> NodeId {
    let symbols = symbols
      .iter()
      .map(|(name, alias)| ImportSymbol {
        name: name.to_string(),
        alias: alias.map(str::to_string),
      })
      .collect();

    self.node(
      AstKind::Import {
        module: module.to_string(),
        alias: None,
        symbols,
        all: false,
      },
      vec![],
    )
  }

  pub fn import_all(&mut self, module: &str) -> NodeId {
    self.node(
      AstKind::Import {
        module: module.to_string(),
        alias: None,
        symbols: vec![],
        all: true,
      },
      vec![],
    )
  }

  /// Import a module as a whole, bound to its name or `alias`
  pub fn import_module(&mut self, module: &str, alias: Option<&str>) -> NodeId {
    self.node(
      AstKind::Import {
        module: module.to_string(),
        alias: alias.map(str::to_string),
        symbols: vec![],
        all: false,
      },
      vec![],
    )
  }

  pub fn id(&mut self, name: &str) -> NodeId {
    self.node(
      AstKind::Id {
        name: name.to_string(),
        binding: None,
      },
      vec![],
    )
  }

  pub fn self_ref(&mut self) -> NodeId {
    self.node(AstKind::SelfRef, vec![])
  }

  pub fn literal(&mut self, constant: Constant) -> NodeId {
    self.node(AstKind::Literal(constant), vec![])
  }

  pub fn int(&mut self, value: i64) -> NodeId {
    let constant = match i32::try_from(value) {
      Ok(value) => Constant::Int(value),
      Err(_) => Constant::Long(value),
    };
    self.literal(constant)
  }

  pub fn float(&mut self, value: f64) -> NodeId {
    self.literal(Constant::Double(value))
  }

  pub fn string(&mut self, value: &str) -> NodeId {
    self.literal(Constant::Str(value.to_string()))
  }

  pub fn bool(&mut self, value: bool) -> NodeId {
    self.literal(Constant::Bool(value))
  }

  pub fn null(&mut self) -> NodeId {
    self.literal(Constant::Null)
  }

  pub fn list(&mut self, elements: Vec<NodeId>) -> NodeId {
    self.node(AstKind::List, elements)
  }

  pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
    self.node(AstKind::Binary(op), vec![left, right])
  }

  pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
    self.node(AstKind::Unary(op), vec![operand])
  }

  pub fn and(&mut self, left: NodeId, right: NodeId) -> NodeId {
    self.node(AstKind::Logical(LogicalOp::And), vec![left, right])
  }

  pub fn or(&mut self, left: NodeId, right: NodeId) -> NodeId {
    self.node(AstKind::Logical(LogicalOp::Or), vec![left, right])
  }

  pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
    self.node(AstKind::Assign, vec![target, value])
  }

  pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
    let mut children = vec![callee];
    children.extend(args);
    self.node(AstKind::Call, children)
  }

  pub fn member(&mut self, target: NodeId, name: &str) -> NodeId {
    self.node(
      AstKind::Member {
        name: name.to_string(),
      },
      vec![target],
    )
  }

  /// Call the member `name` of `target`
  pub fn invoke(&mut self, target: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
    let callee = self.member(target, name);
    self.call(callee, args)
  }

  /// Bind the method `name` to `receiver`
  pub fn bind(&mut self, name: &str, receiver: NodeId) -> NodeId {
    let method = self.id(name);
    self.node(AstKind::MethodBind, vec![method, receiver])
  }

  pub fn if_(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
    self.if_chain(vec![(cond, then)], otherwise)
  }

  /// An if with else if branches
  pub fn if_chain(&mut self, branches: Vec<(NodeId, NodeId)>, otherwise: Option<NodeId>) -> NodeId {
    let mut children: Vec<NodeId> = branches
      .into_iter()
      .flat_map(|(cond, then)| [cond, then])
      .collect();
    children.extend(otherwise);
    self.node(AstKind::If, children)
  }

  pub fn while_(&mut self, cond: NodeId, body: NodeId) -> NodeId {
    self.node(AstKind::While, vec![cond, body])
  }

  pub fn for_(&mut self, name: &str, iterable: NodeId, body: NodeId) -> NodeId {
    self.node(
      AstKind::For {
        name: name.to_string(),
        iterator: 0,
      },
      vec![iterable, body],
    )
  }

  pub fn break_(&mut self) -> NodeId {
    self.node(AstKind::Break, vec![])
  }

  pub fn continue_(&mut self) -> NodeId {
    self.node(AstKind::Continue, vec![])
  }

  pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
    self.node(AstKind::Return, value.into_iter().collect())
  }

  pub fn throw(&mut self, value: NodeId) -> NodeId {
    self.node(AstKind::Throw, vec![value])
  }

  /// A try block with a single catch binding `name`
  pub fn try_catch(&mut self, body: NodeId, name: &str, catch: NodeId) -> NodeId {
    let catch = self.node(
      AstKind::Catch {
        name: name.to_string(),
      },
      vec![catch],
    );
    self.node(AstKind::Try, vec![body, catch])
  }

  pub fn expr(&mut self, expression: NodeId) -> NodeId {
    self.node(AstKind::ExprStmt, vec![expression])
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn builder_records_lines() {
    let mut b = AstBuilder::new();
    b.at(3);
    let one = b.int(1);
    b.at(4);
    let stmt = b.expr(one);
    let ast = b.module("main", vec![stmt]);

    assert_eq!(ast.node(one).line, 3);
    assert_eq!(ast.node(stmt).line, 4);
    assert_eq!(ast.children(ast.root()), &[stmt]);
  }

  #[test]
  fn int_literal_width() {
    let mut b = AstBuilder::new();
    let small = b.int(5);
    let large = b.int(1 << 40);
    let ast = b.module("main", vec![]);

    assert_eq!(ast.kind(small), &AstKind::Literal(Constant::Int(5)));
    assert_eq!(ast.kind(large), &AstKind::Literal(Constant::Long(1 << 40)));
  }

  #[test]
  fn method_children() {
    let mut b = AstBuilder::new();
    let x = b.param("x");
    let method = b.method("get", vec![x], vec![]);
    let ast = b.module("main", vec![]);

    let children = ast.children(method);
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], x);
    assert_eq!(ast.kind(children[1]), &AstKind::Block);
  }

  #[test]
  fn replace_child() {
    let mut b = AstBuilder::new();
    let id = b.id("a");
    let stmt = b.expr(id);
    let mut ast = b.module("main", vec![stmt]);

    let self_ref = ast.add(AstKind::SelfRef, vec![], 1);
    ast.replace_child(stmt, 0, self_ref);
    assert_eq!(ast.children(stmt), &[self_ref]);
  }
}
