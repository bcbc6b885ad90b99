/// Name of the synthesized module initializer
pub const MODULE_INIT: &str = "$module_init$";

/// Name of the synthesized shared field initializer of a class
pub const CLASS_INIT: &str = "$class_init$";

/// Name of the synthesized instance field initializer of a class
pub const INSTANCE_INIT: &str = "$instance_init$";

/// Prefix given to every class constructor
pub const CONSTRUCTOR_PREFIX: &str = "$init$";

/// Prefix of the module field holding an imported module
pub const IMPORT_PREFIX: &str = "$import$";

/// The receiver keyword
pub const SELF: &str = "self";

/// Debug name of anonymous methods
pub const LAMBDA: &str = "<lambda>";

/// The internal name of the constructor of `class`
pub fn constructor_name(class: &str) -> String {
  format!("{CONSTRUCTOR_PREFIX}{class}")
}

/// The internal name of the module field referring to `module`
pub fn import_field(module: &str) -> String {
  format!("{IMPORT_PREFIX}{module}")
}

/// Is this name reserved for compiler synthesized members
pub fn is_internal(name: &str) -> bool {
  name.starts_with('$')
}

/// Is this the debug name of a constructor or an initializer
pub fn is_initializer(name: &str) -> bool {
  name.starts_with(CONSTRUCTOR_PREFIX)
    || name == MODULE_INIT
    || name == CLASS_INIT
    || name == INSTANCE_INIT
}
