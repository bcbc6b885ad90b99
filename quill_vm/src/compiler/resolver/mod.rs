//! Resolution of a parsed module. Each pass walks the tree once and either
//! annotates it or rewrites it in place. A pass that reports errors stops
//! the pipeline before the next pass runs.

mod access;
mod declare;
mod imports;
mod synthesize;
mod upvalues;

use super::{error::CompileError, ir::ast::Ast};
use log::trace;
use quill_core::import::ImportResolver;

pub type PassResult = Result<(), Vec<CompileError>>;

/// Run every resolution pass over `ast`
pub fn resolve(ast: &mut Ast, imports: &dyn ImportResolver) -> PassResult {
  declare::declare(ast)?;
  trace!("declared {} symbol tables", ast.tables.len());

  imports::resolve_imports(ast, imports)?;
  synthesize::constructors(ast)?;
  synthesize::initializers(ast)?;
  access::rewrite(ast)?;
  upvalues::capture(ast)
}

fn finish(errors: Vec<CompileError>) -> PassResult {
  if errors.is_empty() {
    Ok(())
  } else {
    Err(errors)
  }
}
