use super::{CClass, CMethod};
use crate::Map;
use std::{
  fmt,
  hash::{Hash, Hasher},
  sync::Arc,
};

/// A literal value stored in a module's constant pool or
/// as the initial value of a namespace entry
#[derive(Debug, Clone)]
pub enum Constant {
  Null,
  Byte(i8),
  Bool(bool),
  Short(i16),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  Str(String),
  Method(Arc<CMethod>),
  Class(Arc<CClass>),
}

impl Constant {
  /// The tag byte identifying this constant in a binary module
  pub fn tag(&self) -> u8 {
    match self {
      Constant::Null => 0,
      Constant::Byte(_) => 1,
      Constant::Bool(_) => 2,
      Constant::Short(_) => 3,
      Constant::Int(_) => 4,
      Constant::Long(_) => 5,
      Constant::Float(_) => 6,
      Constant::Double(_) => 7,
      Constant::Str(_) => 8,
      Constant::Method(_) => 9,
      Constant::Class(_) => 10,
    }
  }

  /// Widen any integral constant
  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Constant::Byte(b) => Some(*b as i64),
      Constant::Short(s) => Some(*s as i64),
      Constant::Int(i) => Some(*i as i64),
      Constant::Long(l) => Some(*l),
      _ => None,
    }
  }

  /// Widen any floating point constant
  pub fn as_float(&self) -> Option<f64> {
    match self {
      Constant::Float(f) => Some(*f as f64),
      Constant::Double(d) => Some(*d),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Constant::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_method(&self) -> Option<&Arc<CMethod>> {
    match self {
      Constant::Method(method) => Some(method),
      _ => None,
    }
  }

  pub fn as_class(&self) -> Option<&Arc<CClass>> {
    match self {
      Constant::Class(class) => Some(class),
      _ => None,
    }
  }
}

// floats compare by bit pattern so the pool can dedup them,
// NaN included
impl PartialEq for Constant {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Constant::Null, Constant::Null) => true,
      (Constant::Byte(a), Constant::Byte(b)) => a == b,
      (Constant::Bool(a), Constant::Bool(b)) => a == b,
      (Constant::Short(a), Constant::Short(b)) => a == b,
      (Constant::Int(a), Constant::Int(b)) => a == b,
      (Constant::Long(a), Constant::Long(b)) => a == b,
      (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
      (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
      (Constant::Str(a), Constant::Str(b)) => a == b,
      (Constant::Method(a), Constant::Method(b)) => a == b,
      (Constant::Class(a), Constant::Class(b)) => a == b,
      _ => false,
    }
  }
}

impl Eq for Constant {}

impl Hash for Constant {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.tag().hash(state);

    match self {
      Constant::Null => (),
      Constant::Byte(b) => b.hash(state),
      Constant::Bool(b) => b.hash(state),
      Constant::Short(s) => s.hash(state),
      Constant::Int(i) => i.hash(state),
      Constant::Long(l) => l.hash(state),
      Constant::Float(f) => f.to_bits().hash(state),
      Constant::Double(d) => d.to_bits().hash(state),
      Constant::Str(s) => s.hash(state),
      Constant::Method(method) => {
        method.name.hash(state);
        method.code.hash(state);
      },
      Constant::Class(class) => class.name.hash(state),
    }
  }
}

impl fmt::Display for Constant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Constant::Null => write!(f, "null"),
      Constant::Byte(b) => write!(f, "{b}"),
      Constant::Bool(b) => write!(f, "{b}"),
      Constant::Short(s) => write!(f, "{s}"),
      Constant::Int(i) => write!(f, "{i}"),
      Constant::Long(l) => write!(f, "{l}"),
      Constant::Float(n) => write!(f, "{n}"),
      Constant::Double(n) => write!(f, "{n}"),
      Constant::Str(s) => write!(f, "'{s}'"),
      Constant::Method(method) => write!(f, "<method {}>", method.name),
      Constant::Class(class) => write!(f, "<class {}>", class.name),
    }
  }
}

/// An ordered, deduplicated and append only list of constants
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
  /// The constants in index order
  values: Vec<Constant>,

  /// Reverse lookup from a constant to its index
  index: Map<Constant, u32>,
}

impl ConstantPool {
  /// Build a pool from constants in index order. Duplicates are kept
  /// in place so existing indices stay valid
  pub fn from_values(values: Vec<Constant>) -> Self {
    let mut index = Map::default();
    for (idx, value) in values.iter().enumerate() {
      index.entry(value.clone()).or_insert(idx as u32);
    }

    Self { values, index }
  }

  /// Add a constant returning its index. A constant already
  /// present is not added again
  pub fn add(&mut self, value: Constant) -> u32 {
    if let Some(index) = self.index.get(&value) {
      return *index;
    }

    let index = self.values.len() as u32;
    self.index.insert(value.clone(), index);
    self.values.push(value);
    index
  }

  /// Retrieve the constant at `index`
  pub fn get(&self, index: usize) -> Option<&Constant> {
    self.values.get(index)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Constant> {
    self.values.iter()
  }
}

impl PartialEq for ConstantPool {
  fn eq(&self, other: &Self) -> bool {
    self.values == other.values
  }
}

#[cfg(test)]
mod test {
  use super::*;

  mod constant {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
      assert_eq!(Constant::Double(f64::NAN), Constant::Double(f64::NAN));
      assert_ne!(Constant::Double(0.0), Constant::Double(-0.0));
      assert_ne!(Constant::Int(1), Constant::Long(1));
    }

    #[test]
    fn widen() {
      assert_eq!(Constant::Short(-3).as_integer(), Some(-3));
      assert_eq!(Constant::Float(1.5).as_float(), Some(1.5));
      assert_eq!(Constant::Str("x".to_string()).as_integer(), None);
    }
  }

  mod constant_pool {
    use super::*;

    #[test]
    fn add_dedups() {
      let mut pool = ConstantPool::default();

      let first = pool.add(Constant::Int(5));
      let other = pool.add(Constant::Str("five".to_string()));
      let second = pool.add(Constant::Int(5));

      assert_eq!(first, second);
      assert_ne!(first, other);
      assert_eq!(pool.len(), 2);
    }

    #[test]
    fn from_values_keeps_indices() {
      let pool = ConstantPool::from_values(vec![
        Constant::Int(1),
        Constant::Int(2),
        Constant::Int(1),
      ]);

      assert_eq!(pool.len(), 3);
      assert_eq!(pool.get(2), Some(&Constant::Int(1)));
    }

    #[test]
    fn from_values_dedups_to_first() {
      let mut pool = ConstantPool::from_values(vec![Constant::Int(1), Constant::Int(1)]);
      assert_eq!(pool.add(Constant::Int(1)), 0);
    }
  }
}
