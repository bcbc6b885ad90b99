use crate::value::{List, Value};

/// An iterator over a list, observing elements pushed while iterating
pub struct ListIter {
  list: List,
  index: usize,
}

impl ListIter {
  pub fn new(list: List) -> Self {
    Self { list, index: 0 }
  }
}

impl Iterator for ListIter {
  type Item = Value;

  fn next(&mut self) -> Option<Value> {
    let value = self.list.borrow().get(self.index).cloned();
    if value.is_some() {
      self.index += 1;
    }
    value
  }
}
