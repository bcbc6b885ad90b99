mod constant;
mod method;
mod module;

pub use constant::{Constant, ConstantPool};
pub use method::{CMethod, DebugEntry, ExceptionEntry};
pub use module::{CClass, CModule, Import, Namespace, NamespaceEntry, NamespaceFlags};
