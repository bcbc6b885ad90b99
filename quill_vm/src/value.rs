use crate::object::{Class, Closure, Instance, ListIter, Module, NativeFunction};
use quill_core::chunk::Constant;
use std::{cell::RefCell, fmt, rc::Rc};

/// A shared mutable list
pub type List = Rc<RefCell<Vec<Value>>>;

/// A runtime value of the quill language
#[derive(Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(Rc<str>),
  List(List),
  Iter(Rc<RefCell<ListIter>>),
  Instance(Rc<Instance>),
  Class(Rc<Class>),
  Module(Rc<Module>),
  Closure(Rc<Closure>),
  Native(Rc<NativeFunction>),

  /// A local slot captured by a nested method
  Box(Rc<RefCell<Value>>),
}

impl Value {
  /// Only null and false are falsey
  pub fn is_truthy(&self) -> bool {
    !matches!(self, Value::Null | Value::Bool(false))
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn list(values: Vec<Value>) -> Self {
    Value::List(Rc::new(RefCell::new(values)))
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(string) => Some(string),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(int) => Some(*int),
      _ => None,
    }
  }

  /// The name of this value's type used in error messages
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::Str(_) => "string",
      Value::List(_) => "list",
      Value::Iter(_) => "iterator",
      Value::Instance(_) => "instance",
      Value::Class(_) => "class",
      Value::Module(_) => "module",
      Value::Closure(_) => "method",
      Value::Native(_) => "native",
      Value::Box(_) => "box",
    }
  }

  /// The runtime value of a scalar constant. Methods and classes are
  /// instantiated by the loader instead
  pub fn from_constant(constant: &Constant) -> Option<Self> {
    match constant {
      Constant::Null => Some(Value::Null),
      Constant::Bool(b) => Some(Value::Bool(*b)),
      Constant::Str(string) => Some(Value::from(string.as_str())),
      Constant::Method(_) | Constant::Class(_) => None,
      other => other
        .as_integer()
        .map(Value::Int)
        .or_else(|| other.as_float().map(Value::Float)),
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(int: i64) -> Self {
    Value::Int(int)
  }
}

impl From<f64> for Value {
  fn from(float: f64) -> Self {
    Value::Float(float)
  }
}

impl From<&str> for Value {
  fn from(string: &str) -> Self {
    Value::Str(Rc::from(string))
  }
}

impl From<String> for Value {
  fn from(string: String) -> Self {
    Value::Str(Rc::from(string))
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
      (Value::Iter(a), Value::Iter(b)) => Rc::ptr_eq(a, b),
      (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
      (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
      (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
      (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
      (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
      (Value::Box(a), Value::Box(b)) => Rc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Int(int) => write!(f, "{int}"),
      Value::Float(float) => write!(f, "{float}"),
      Value::Str(string) => write!(f, "{string}"),
      Value::List(list) => {
        write!(f, "[")?;
        for (index, value) in list.borrow().iter().enumerate() {
          if index > 0 {
            write!(f, ", ")?;
          }
          match value {
            Value::Str(string) => write!(f, "'{string}'")?,
            _ => write!(f, "{value}")?,
          }
        }
        write!(f, "]")
      },
      Value::Iter(_) => write!(f, "<iterator>"),
      Value::Instance(instance) => write!(f, "<{} instance>", instance.class().name()),
      Value::Class(class) => write!(f, "<class {}>", class.name()),
      Value::Module(module) => write!(f, "<module {}>", module.name()),
      Value::Closure(closure) => write!(f, "<method {}>", closure.method().name),
      Value::Native(native) => write!(f, "<native {}>", native.name()),
      Value::Box(inner) => write!(f, "{}", inner.borrow()),
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Str(string) => write!(f, "{string:?}"),
      _ => write!(f, "{self}"),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn truthiness() {
    assert!(!Value::Null.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Int(0).is_truthy());
    assert!(Value::from("").is_truthy());
  }

  #[test]
  fn numeric_equality_crosses_types() {
    assert_eq!(Value::Int(2), Value::Float(2.0));
    assert_ne!(Value::Int(2), Value::from("2"));
    assert_eq!(Value::from("a"), Value::from("a".to_string()));
  }

  #[test]
  fn display() {
    let list = Value::list(vec![Value::Int(1), Value::from("two"), Value::Null]);
    assert_eq!(list.to_string(), "[1, 'two', null]");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
  }

  #[test]
  fn from_constant() {
    assert_eq!(Value::from_constant(&Constant::Short(3)), Some(Value::Int(3)));
    assert_eq!(
      Value::from_constant(&Constant::Float(0.5)),
      Some(Value::Float(0.5))
    );
    assert_eq!(
      Value::from_constant(&Constant::Str("hi".to_string())),
      Some(Value::from("hi"))
    );
  }
}
