//! One-shot lazy sequences
//!
//! A generator wraps any iterator of values. It yields each item once and
//! is then exhausted for good; there is no way to rewind it. Draining a
//! generator (which serialization does) consumes it.

use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub struct Generator {
    pub name: String,
    state: RefCell<Box<dyn Iterator<Item = Value>>>,
}

impl Generator {
    pub fn from_iter(name: &str, iter: impl Iterator<Item = Value> + 'static) -> Rc<Generator> {
        Rc::new(Generator {
            name: name.to_string(),
            state: RefCell::new(Box::new(iter)),
        })
    }

    /// A generator replaying a fixed list of values once
    pub fn from_values(name: &str, values: Vec<Value>) -> Rc<Generator> {
        Self::from_iter(name, values.into_iter())
    }

    /// Produce the next value, or `None` once exhausted
    pub fn next_value(&self) -> Option<Value> {
        self.state.borrow_mut().next()
    }

    /// Pull every remaining value, leaving the generator exhausted
    pub fn drain(&self) -> Vec<Value> {
        let mut state = self.state.borrow_mut();
        let values: Vec<Value> = state.by_ref().collect();
        *state = Box::new(std::iter::empty());
        values
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generator {}>", self.name)
    }
}
