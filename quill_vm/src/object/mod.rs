mod class;
mod closure;
mod instance;
mod iter;
mod module;
mod native;

pub use class::{Class, InitState};
pub use closure::Closure;
pub use instance::Instance;
pub use iter::ListIter;
pub use module::Module;
pub use native::{NativeFn, NativeFunction};
