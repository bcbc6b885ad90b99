#![deny(clippy::all)]

mod byte_code;
pub mod compiler;
pub mod env;
pub mod fiber;
mod natives;
pub mod object;
pub mod value;
pub mod vm;
use codespan_reporting::diagnostic::Diagnostic;

#[cfg(any(test, feature = "debug"))]
pub mod debug;

/// The result of a compilation
pub type FeResult<T, F> = Result<T, Vec<Diagnostic<F>>>;
