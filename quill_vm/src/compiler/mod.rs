pub mod assembler;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod resolver;

use crate::FeResult;
use codespan_reporting::{
  diagnostic::Diagnostic,
  files::Files,
  term::{self, termcolor::WriteColor, Config},
};
use ir::ast::Ast;
use log::debug;
use quill_core::{chunk::CModule, import::ImportResolver};
use std::io;

/// Runs the resolver passes and code generation over a parsed module
pub struct Compiler<'a, F> {
  /// The file diagnostics are reported against
  file_id: F,

  /// The exports of every module this one may import
  imports: &'a dyn ImportResolver,
}

impl<'a, F: Copy> Compiler<'a, F> {
  pub fn new(file_id: F, imports: &'a dyn ImportResolver) -> Self {
    Self { file_id, imports }
  }

  /// Compile `ast` into a module. No module is produced when any
  /// pass reports an error
  pub fn compile(&self, mut ast: Ast) -> FeResult<CModule, F> {
    debug!("resolving {} nodes", ast.len());
    resolver::resolve(&mut ast, self.imports).map_err(|errors| {
      errors
        .iter()
        .map(|error| error.to_diagnostic(self.file_id))
        .collect::<Vec<Diagnostic<F>>>()
    })?;

    let module = codegen::generate(&ast).map_err(|error| vec![error.to_diagnostic(self.file_id)])?;
    debug!(
      "compiled module '{}' with {} constants",
      module.name,
      module.constants.len()
    );
    Ok(module)
  }
}

/// Render diagnostics to `out`, falling back to the bare message when
/// a label cannot be located in `files`
pub fn report_diagnostics<'f, Fs: Files<'f>>(
  files: &'f Fs,
  diagnostics: &[Diagnostic<Fs::FileId>],
  out: &mut dyn WriteColor,
) -> io::Result<()> {
  let config = Config::default();

  for diagnostic in diagnostics {
    if term::emit(out, &config, files, diagnostic).is_err() {
      writeln!(out, "error: {}", diagnostic.message)?;
    }
  }

  Ok(())
}
