use super::{finish, PassResult};
use crate::compiler::{
  error::CompileError,
  ir::{
    ast::{Ast, AstKind, ImportSymbol, Span},
    symbol_table::{AddSymbolResult, TableId},
  },
};
use quill_core::{
  import::ImportResolver,
  symbol::{ImportBinding, ScopeKind, Symbol},
};

/// Bind every imported name into the module scope
pub fn resolve_imports(ast: &mut Ast, resolver: &dyn ImportResolver) -> PassResult {
  let root = ast.root();
  let table = match ast.node(root).table {
    Some(table) => table,
    None => {
      return Err(vec![CompileError::structural(
        "Module was not declared.",
        ast.node(root).span,
      )])
    },
  };

  let mut errors = vec![];
  for child in ast.children(root).to_vec() {
    let span = ast.node(child).span;

    let (module, alias, symbols, all) = match ast.kind(child) {
      AstKind::Import {
        module,
        alias,
        symbols,
        all,
      } => (module.clone(), alias.clone(), symbols.clone(), *all),
      _ => continue,
    };

    let imported: Vec<Symbol> = if all {
      match resolver.resolve_symbols(&module) {
        Some(symbols) => symbols
          .into_iter()
          .map(|symbol| {
            let name = symbol.name().to_string();
            Symbol::new(name.clone(), ScopeKind::Module)
              .with_flags(symbol.flags())
              .with_import(ImportBinding {
                module: module.clone(),
                name: Some(name),
                alias: None,
              })
          })
          .collect(),
        None => {
          errors.push(CompileError::unresolved(&module, "*", span));
          continue;
        },
      }
    } else if symbols.is_empty() {
      if !resolver.has_module(&module) {
        errors.push(CompileError::unresolved(&module, &module, span));
        continue;
      }

      let local = alias.clone().unwrap_or_else(|| module.clone());
      vec![
        Symbol::new(local, ScopeKind::Module).with_import(ImportBinding {
          module: module.clone(),
          name: None,
          alias,
        }),
      ]
    } else {
      let mut imported = vec![];
      for ImportSymbol { name, alias } in symbols {
        match resolver.resolve(&module, &name) {
          Some(symbol) => {
            let local = alias.clone().unwrap_or_else(|| name.clone());
            imported.push(
              Symbol::new(local, ScopeKind::Module)
                .with_flags(symbol.flags())
                .with_import(ImportBinding {
                  module: module.clone(),
                  name: Some(name),
                  alias,
                }),
            );
          },
          None => errors.push(CompileError::unresolved(&module, &name, span)),
        }
      }
      imported
    };

    for symbol in imported {
      bind(ast, table, symbol, span, &mut errors);
    }
  }

  finish(errors)
}

fn bind(
  ast: &mut Ast,
  table: TableId,
  symbol: Symbol,
  span: Span,
  errors: &mut Vec<CompileError>,
) {
  let name = symbol.name().to_string();
  if ast.tables.get_mut(table).add_symbol(symbol, None) == AddSymbolResult::DuplicateSymbol {
    errors.push(CompileError::duplicate(&name, span));
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::compiler::{ir::ast::AstBuilder, resolver::declare::declare};
  use quill_core::import::ModuleResolver;

  fn resolver() -> ModuleResolver {
    let mut resolver = ModuleResolver::default();
    resolver.add_exports("std", &["print", "range"]);
    resolver
  }

  #[test]
  fn aliased_symbol() {
    let mut b = AstBuilder::new();
    let import = b.import("std", &[("range", Some("r"))]);
    let mut ast = b.module("main", vec![import]);

    declare(&mut ast).expect("declare failed");
    resolve_imports(&mut ast, &resolver()).expect("imports failed");

    let table = ast.node(ast.root()).table.expect("no table");
    let symbol = ast.tables.get(table).get("r").expect("r missing");
    assert_eq!(
      symbol.import(),
      Some(&ImportBinding {
        module: "std".to_string(),
        name: Some("range".to_string()),
        alias: Some("r".to_string()),
      })
    );
  }

  #[test]
  fn import_all() {
    let mut b = AstBuilder::new();
    let import = b.import_all("std");
    let mut ast = b.module("main", vec![import]);

    declare(&mut ast).expect("declare failed");
    resolve_imports(&mut ast, &resolver()).expect("imports failed");

    let table = ast.node(ast.root()).table.expect("no table");
    assert!(ast.tables.get(table).get("print").is_some());
    assert!(ast.tables.get(table).get("range").is_some());
  }

  #[test]
  fn whole_module() {
    let mut b = AstBuilder::new();
    let import = b.import_module("std", None);
    let mut ast = b.module("main", vec![import]);

    declare(&mut ast).expect("declare failed");
    resolve_imports(&mut ast, &resolver()).expect("imports failed");

    let table = ast.node(ast.root()).table.expect("no table");
    let symbol = ast.tables.get(table).get("std").expect("std missing");
    assert_eq!(symbol.import().and_then(|i| i.name.as_ref()), None);
  }

  #[test]
  fn unknown_module() {
    let mut b = AstBuilder::new();
    let import = b.import_module("net", None);
    let mut ast = b.module("main", vec![import]);

    declare(&mut ast).expect("declare failed");
    assert!(resolve_imports(&mut ast, &resolver()).is_err());
  }
}
