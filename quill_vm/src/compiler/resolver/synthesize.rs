use super::{finish, PassResult};
use crate::compiler::{
  error::CompileError,
  ir::{
    ast::{Ast, AstKind, NodeId},
    symbol_table::TableId,
  },
};
use quill_core::{
  constants::{constructor_name, import_field, CLASS_INIT, INSTANCE_INIT, MODULE_INIT},
  symbol::{ScopeKind, Symbol, SymbolFlags},
  Set,
};

/// Give every class exactly one constructor named `$init$Name`,
/// renaming a method named after the class or synthesizing an empty one
pub fn constructors(ast: &mut Ast) -> PassResult {
  let mut errors = vec![];

  for class in classes(ast) {
    let (name, table) = match (ast.kind(class), ast.node(class).table) {
      (AstKind::Class { name }, Some(table)) => (name.clone(), table),
      _ => continue,
    };
    let constructor = constructor_name(&name);

    let existing = ast.children(class).iter().copied().find(
      |child| matches!(ast.kind(*child), AstKind::Method { name: method, .. } if *method == name),
    );

    match existing {
      Some(method) => {
        let node = ast.node_mut(method);
        if let AstKind::Method {
          name: method_name,
          shared,
          ..
        } = &mut node.kind
        {
          if *shared {
            errors.push(CompileError::structural(
              format!("Constructor of '{name}' cannot be shared."),
              node.span,
            ));
          }
          *method_name = constructor.clone();
        }
        if let Some(symbol) = &mut node.symbol {
          symbol.rename(constructor.clone());
        }
        ast.tables.get_mut(table).rename(&name, &constructor);
      },
      None => {
        let line = ast.node(class).line;
        let method = synthesize_method(ast, table, &constructor, false, vec![], line);

        let symbol = Symbol::new(constructor, ScopeKind::Class).with_flags(SymbolFlags::METHOD);
        ast.node_mut(method).symbol = Some(symbol.clone());
        ast.tables.get_mut(table).add_symbol(symbol, Some(method));
        ast.push_child(class, method);
      },
    }
  }

  finish(errors)
}

/// Move field initializers and top level statements into synthesized
/// initializer methods
pub fn initializers(ast: &mut Ast) -> PassResult {
  let root = ast.root();
  let (table, locals) = match (ast.kind(root), ast.node(root).table) {
    (AstKind::Module { locals, .. }, Some(table)) => (table, *locals),
    _ => {
      return Err(vec![CompileError::structural(
        "Module was not declared.",
        ast.node(root).span,
      )])
    },
  };

  let children = ast.children(root).to_vec();
  let mut kept = vec![];
  let mut body = vec![];

  // bind each imported module to a module field first
  let mut seen = Set::default();
  for child in &children {
    let module = match ast.kind(*child) {
      AstKind::Import { module, .. } => module.clone(),
      _ => continue,
    };
    if !seen.insert(module.clone()) {
      continue;
    }

    let line = ast.node(*child).line;
    let field = import_field(&module);
    let declaration = ast.add(
      AstKind::VarDec {
        name: field.clone(),
        flags: SymbolFlags::FINAL,
      },
      vec![],
      line,
    );
    let symbol = Symbol::new(field.clone(), ScopeKind::Module).with_flags(SymbolFlags::FINAL);
    ast.node_mut(declaration).symbol = Some(symbol.clone());
    ast.tables.get_mut(table).add_symbol(symbol, Some(declaration));
    kept.push(declaration);

    let module_ref = ast.add(AstKind::ModuleRef, vec![], line);
    let target = ast.add(AstKind::Member { name: field }, vec![module_ref], line);
    let value = ast.add(AstKind::ImportModule { module }, vec![], line);
    body.push(assignment(ast, target, value, line));
  }

  // then run each class's shared initializer
  for child in &children {
    let name = match ast.kind(*child) {
      AstKind::Class { name } => name.clone(),
      _ => continue,
    };

    class_initializers(ast, *child);

    let line = ast.node(*child).line;
    let module_ref = ast.add(AstKind::ModuleRef, vec![], line);
    let class = ast.add(AstKind::Member { name: name.clone() }, vec![module_ref], line);
    body.push(ast.add(AstKind::InitClass { name }, vec![class], line));
  }

  // and finally every top level statement in source order
  for child in children {
    match ast.kind(child).clone() {
      AstKind::Class { .. } | AstKind::Method { .. } | AstKind::Import { .. } => kept.push(child),
      AstKind::VarDec { name, .. } => {
        kept.push(child);
        if let Some(init) = take_initializer(ast, child) {
          let line = ast.node(child).line;
          let target = ast.add(AstKind::Id { name, binding: None }, vec![], line);
          body.push(assignment(ast, target, init, line));
        }
      },
      _ => body.push(child),
    }
  }

  let init = synthesize_method(ast, table, MODULE_INIT, false, body, 0);
  if let AstKind::Method {
    locals: init_locals,
    ..
  } = &mut ast.node_mut(init).kind
  {
    *init_locals = locals;
  }
  kept.push(init);

  ast.node_mut(root).children = kept;
  Ok(())
}

fn classes(ast: &Ast) -> Vec<NodeId> {
  ast
    .children(ast.root())
    .iter()
    .copied()
    .filter(|child| matches!(ast.kind(*child), AstKind::Class { .. }))
    .collect()
}

fn class_initializers(ast: &mut Ast, class: NodeId) {
  let table = match ast.node(class).table {
    Some(table) => table,
    None => return,
  };

  let mut shared = vec![];
  let mut instance = vec![];

  for child in ast.children(class).to_vec() {
    let (name, flags) = match ast.kind(child) {
      AstKind::VarDec { name, flags } => (name.clone(), *flags),
      _ => continue,
    };

    if let Some(init) = take_initializer(ast, child) {
      let line = ast.node(child).line;
      let target = ast.add(AstKind::Id { name, binding: None }, vec![], line);
      let statement = assignment(ast, target, init, line);

      if flags.contains(SymbolFlags::SHARED) {
        shared.push(statement);
      } else {
        instance.push(statement);
      }
    }
  }

  let line = ast.node(class).line;
  let class_init = synthesize_method(ast, table, CLASS_INIT, true, shared, line);
  let instance_init = synthesize_method(ast, table, INSTANCE_INIT, false, instance, line);
  ast.push_child(class, class_init);
  ast.push_child(class, instance_init);
}

fn take_initializer(ast: &mut Ast, declaration: NodeId) -> Option<NodeId> {
  let node = ast.node_mut(declaration);
  if node.children.is_empty() {
    None
  } else {
    Some(node.children.remove(0))
  }
}

fn assignment(ast: &mut Ast, target: NodeId, value: NodeId, line: u32) -> NodeId {
  let assign = ast.add(AstKind::Assign, vec![target, value], line);
  ast.add(AstKind::ExprStmt, vec![assign], line)
}

/// Create a method with a block body holding `statements`, scoped in `parent`
fn synthesize_method(
  ast: &mut Ast,
  parent: TableId,
  name: &str,
  shared: bool,
  statements: Vec<NodeId>,
  line: u32,
) -> NodeId {
  let qualified = format!("{}.{}", ast.tables.get(parent).name(), name);
  let method_table = ast
    .tables
    .push(ScopeKind::Method, Some(parent), qualified.clone());
  let block_table = ast
    .tables
    .push(ScopeKind::Local, Some(method_table), qualified);

  let block = ast.add(AstKind::Block, statements, line);
  ast.node_mut(block).table = Some(block_table);

  let method = ast.add(
    AstKind::Method {
      name: name.to_string(),
      shared,
      lambda: false,
      locals: 0,
      captures: vec![],
    },
    vec![block],
    line,
  );
  ast.node_mut(method).table = Some(method_table);
  method
}
