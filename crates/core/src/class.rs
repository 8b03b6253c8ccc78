//! Classes and instances
//!
//! Classes keep a mutable attribute table so that a class can be patched
//! after construction (a method or attribute that refers back to the class
//! it belongs to). Instances are bare attribute bags tied to a class.

use crate::value::Value;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Attribute table of a class or instance
pub type Attrs = IndexMap<String, Value>;

/// Name of the universal root class
pub const ROOT_CLASS_NAME: &str = "object";

thread_local! {
    static ROOT: Rc<Class> = Rc::new(Class {
        name: ROOT_CLASS_NAME.to_string(),
        bases: Vec::new(),
        attrs: RefCell::new(IndexMap::new()),
        root: true,
    });
}

/// A class descriptor
pub struct Class {
    pub name: String,
    pub bases: Vec<Rc<Class>>,
    attrs: RefCell<Attrs>,
    root: bool,
}

impl Class {
    pub fn new(name: &str, bases: Vec<Rc<Class>>, attrs: Attrs) -> Rc<Class> {
        Rc::new(Class {
            name: name.to_string(),
            bases,
            attrs: RefCell::new(attrs),
            root: false,
        })
    }

    /// The universal base class (one per thread)
    pub fn root() -> Rc<Class> {
        ROOT.with(Rc::clone)
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn attrs(&self) -> Ref<'_, Attrs> {
        self.attrs.borrow()
    }

    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        self.attrs.borrow_mut().insert(name.to_string(), value);
    }

    /// Method resolution order: depth-first, left to right, first occurrence wins
    pub fn mro(self: &Rc<Self>) -> Vec<Rc<Class>> {
        let mut out: Vec<Rc<Class>> = Vec::new();
        push_mro(self, &mut out);
        out
    }

    /// Look `name` up along the MRO
    pub fn lookup(self: &Rc<Self>, name: &str) -> Option<Value> {
        self.mro().iter().find_map(|c| c.get_own(name))
    }

    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Class>) -> bool {
        self.mro().iter().any(|c| Rc::ptr_eq(c, other))
    }

    /// Bases other than the implicit root
    pub fn explicit_bases(&self) -> impl Iterator<Item = &Rc<Class>> {
        self.bases.iter().filter(|base| !base.root)
    }

    /// Same name, same explicit base names, same attribute names
    pub fn shape_eq(&self, other: &Class) -> bool {
        self.name == other.name
            && self.root == other.root
            && self
                .explicit_bases()
                .map(|b| &b.name)
                .eq(other.explicit_bases().map(|b| &b.name))
            && self.attrs.borrow().keys().eq(other.attrs.borrow().keys())
    }

    /// Full structural comparison
    ///
    /// Class-valued attributes are compared by shape only, so a class that
    /// holds a reference to itself still compares in bounded time.
    pub fn structurally_eq(&self, other: &Class) -> bool {
        if !self.shape_eq(other) {
            return false;
        }
        let bases_eq = self
            .explicit_bases()
            .zip(other.explicit_bases())
            .all(|(a, b)| Rc::ptr_eq(a, b) || a.structurally_eq(b));
        if !bases_eq {
            return false;
        }
        let mine = self.attrs.borrow();
        let theirs = other.attrs.borrow();
        mine.iter().all(|(name, value)| match (value, theirs.get(name)) {
            (Value::Class(a), Some(Value::Class(b))) => a.shape_eq(b),
            (a, Some(b)) => a == b,
            (_, None) => false,
        })
    }
}

fn push_mro(class: &Rc<Class>, out: &mut Vec<Rc<Class>>) {
    if out.iter().any(|c| Rc::ptr_eq(c, class)) {
        return;
    }
    out.push(class.clone());
    for base in &class.bases {
        push_mro(base, out);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.name)
    }
}

/// An instance of a class
pub struct Instance {
    pub class: Rc<Class>,
    attrs: RefCell<Attrs>,
}

impl Instance {
    /// Allocate an instance without running any initializer
    pub fn new_bare(class: Rc<Class>) -> Rc<Instance> {
        Rc::new(Instance {
            class,
            attrs: RefCell::new(IndexMap::new()),
        })
    }

    pub fn attrs(&self) -> Ref<'_, Attrs> {
        self.attrs.borrow()
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        self.attrs.borrow_mut().insert(name.to_string(), value);
    }

    pub fn structurally_eq(&self, other: &Instance) -> bool {
        self.class.shape_eq(&other.class) && *self.attrs.borrow() == *other.attrs.borrow()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object>", self.class.name)
    }
}
