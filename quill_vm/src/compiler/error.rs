use super::ir::ast::Span;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CompileErrorKind {
  /// A name could not be found in `scope`
  Unresolved { scope: String, symbol: String },

  /// A name was declared twice in one scope
  Duplicate { name: String },

  /// The tree violates a rule of the language
  Structural(String),

  /// A jump label could not be resolved
  Assembly(String),
}

/// An error found while resolving or generating code for a module
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CompileError {
  pub kind: CompileErrorKind,
  pub span: Option<Span>,
}

impl CompileError {
  pub fn unresolved(scope: &str, symbol: &str, span: Span) -> Self {
    Self {
      kind: CompileErrorKind::Unresolved {
        scope: scope.to_string(),
        symbol: symbol.to_string(),
      },
      span: Some(span),
    }
  }

  pub fn duplicate(name: &str, span: Span) -> Self {
    Self {
      kind: CompileErrorKind::Duplicate {
        name: name.to_string(),
      },
      span: Some(span),
    }
  }

  pub fn structural(message: impl Into<String>, span: Span) -> Self {
    Self {
      kind: CompileErrorKind::Structural(message.into()),
      span: Some(span),
    }
  }

  pub fn assembly(message: impl Into<String>) -> Self {
    Self {
      kind: CompileErrorKind::Assembly(message.into()),
      span: None,
    }
  }

  /// Report this error against the file `file_id`
  pub fn to_diagnostic<F: Copy>(&self, file_id: F) -> Diagnostic<F> {
    let diagnostic = Diagnostic::error().with_message(self.to_string());

    match self.span {
      Some(span) if span.end > span.start => {
        diagnostic.with_labels(vec![Label::primary(file_id, span)])
      },
      _ => diagnostic,
    }
  }
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      CompileErrorKind::Unresolved { scope, symbol } => {
        write!(f, "Unresolved symbol '{symbol}' in '{scope}'.")
      },
      CompileErrorKind::Duplicate { name } => write!(f, "'{name}' was already declared."),
      CompileErrorKind::Structural(message) => write!(f, "{message}"),
      CompileErrorKind::Assembly(message) => write!(f, "Assembly failed: {message}."),
    }
  }
}

pub type CompileResult<T> = Result<T, CompileError>;
