//! Value: the object graph a host program builds
//!
//! `Value` is a closed sum type over every kind of object the serializer
//! knows how to walk. Atomic kinds are stored inline; everything with
//! identity lives behind an `Rc` so that two `Value`s can point at the same
//! object (`same_object`) and so that closures, classes and instances can
//! refer back to each other.
//!
//! # Equality
//!
//! `==` is structural. Containers compare element-wise (dicts and sets
//! ignore insertion order), callables compare by name, code and defaults,
//! and classes compare by name, bases and attributes. Globals tables and
//! closure cells are never followed during comparison since they are
//! where self-reference cycles live.

use crate::class::{Class, Instance};
use crate::code::CodeBlock;
use crate::function::{BoundMethod, Cell, Function, NativeFunction};
use crate::generator::Generator;
use crate::module::Module;
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Insertion-ordered dictionary payload
pub type Dict = IndexMap<Key, Value>;

/// Set payload (insertion ordered, compared as a set)
pub type ValueSet = IndexSet<Key>;

/// A runtime object
#[derive(Clone)]
pub enum Value {
    /// The null value
    None,
    /// The `...` wildcard marker
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex {
        re: f64,
        im: f64,
    },
    Str(Rc<str>),

    /// Mutable ordered sequence
    List(Rc<RefCell<Vec<Value>>>),
    /// Immutable ordered sequence
    Tuple(Rc<[Value]>),
    /// Mutable insertion-ordered mapping
    Dict(Rc<RefCell<Dict>>),
    /// Mutable set of hashable values
    Set(Rc<RefCell<ValueSet>>),
    /// Immutable set of hashable values
    FrozenSet(Rc<ValueSet>),
    /// Raw byte string
    Bytes(Rc<[u8]>),

    /// One-shot lazy sequence
    Generator(Rc<Generator>),
    /// Compiled code block
    Code(Rc<CodeBlock>),
    /// Callable bound to a code block, globals and closure cells
    Function(Rc<Function>),
    /// Function paired with a receiver
    Method(Rc<BoundMethod>),
    /// Builtin implemented in Rust; opaque to the serializer
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    Object(Rc<Instance>),
    /// Importable unit, referenced by name
    Module(Rc<Module>),
    /// Closure cell
    Cell(Rc<Cell>),

    /// Wrapper exposing a function without binding
    StaticMethod(Rc<Value>),
    /// Wrapper binding a function to the class instead of the instance
    ClassMethod(Rc<Value>),
    /// Wrapper calling its getter on attribute access
    Property(Rc<Value>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items))
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(Rc::from(data.into()))
    }

    pub fn dict(entries: impl IntoIterator<Item = (Key, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    pub fn set(items: impl IntoIterator<Item = Key>) -> Value {
        Value::Set(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn frozenset(items: impl IntoIterator<Item = Key>) -> Value {
        Value::FrozenSet(Rc::new(items.into_iter().collect()))
    }

    pub fn function(function: Function) -> Value {
        Value::Function(Rc::new(function))
    }

    pub fn static_method(inner: Value) -> Value {
        Value::StaticMethod(Rc::new(inner))
    }

    pub fn class_method(inner: Value) -> Value {
        Value::ClassMethod(Rc::new(inner))
    }

    pub fn property(getter: Value) -> Value {
        Value::Property(Rc::new(getter))
    }

    /// Name of the value's kind, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Ellipsis => "ellipsis",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex { .. } => "complex",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Bytes(_) => "bytes",
            Value::Generator(_) => "generator",
            Value::Code(_) => "code",
            Value::Function(_) => "function",
            Value::Method(_) => "method",
            Value::Native(_) => "builtin_function",
            Value::Class(_) => "type",
            Value::Object(_) => "object",
            Value::Module(_) => "module",
            Value::Cell(_) => "cell",
            Value::StaticMethod(_) => "staticmethod",
            Value::ClassMethod(_) => "classmethod",
            Value::Property(_) => "property",
        }
    }

    /// Atomic, self-describing values
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::None
                | Value::Ellipsis
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Complex { .. }
                | Value::Str(_)
        )
    }

    /// Identity comparison
    ///
    /// Reference kinds are the same object when they share an allocation.
    /// Primitives have no identity and fall back to `==`.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::FrozenSet(a), Value::FrozenSet(b)) => Rc::ptr_eq(a, b),
            (Value::Bytes(a), Value::Bytes(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => Rc::ptr_eq(a, b),
            (Value::StaticMethod(a), Value::StaticMethod(b))
            | (Value::ClassMethod(a), Value::ClassMethod(b))
            | (Value::Property(a), Value::Property(b)) => Rc::ptr_eq(a, b),
            _ if self.is_primitive() => self == other,
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Complex { re, im } => *re != 0.0 || *im != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Set(items) => !items.borrow().is_empty(),
            Value::FrozenSet(items) => !items.is_empty(),
            Value::Bytes(data) => !data.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Rc<Class>> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Ellipsis, Value::Ellipsis) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Complex { re: ar, im: ai }, Value::Complex { re: br, im: bi }) => {
                ar == br && ai == bi
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::FrozenSet(a), Value::FrozenSet(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b) || a.shape_eq(b),
            (Value::Method(a), Value::Method(b)) => {
                a.function == b.function && a.receiver == b.receiver
            }
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b) || a.structurally_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a.structurally_eq(b),
            (Value::Module(a), Value::Module(b)) => a.name == b.name,
            (Value::Cell(a), Value::Cell(b)) => Rc::ptr_eq(a, b) || a.get() == b.get(),
            (Value::StaticMethod(a), Value::StaticMethod(b))
            | (Value::ClassMethod(a), Value::ClassMethod(b))
            | (Value::Property(a), Value::Property(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Ellipsis => write!(f, "Ellipsis"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Complex { re, im } => write!(f, "({:?}+{:?}j)", re, im),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items.iter() {
                    t.field(item);
                }
                t.finish()
            }
            Value::Dict(entries) => f.debug_map().entries(entries.borrow().iter()).finish(),
            Value::Set(items) => f.debug_set().entries(items.borrow().iter()).finish(),
            Value::FrozenSet(items) => write!(f, "frozenset({:?})", items),
            Value::Bytes(data) => write!(f, "b{:?}", data),
            Value::Generator(g) => write!(f, "{:?}", g),
            Value::Code(c) => write!(f, "<code {}>", c.name),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Method(m) => write!(f, "{:?}", m),
            Value::Native(n) => write!(f, "{:?}", n),
            Value::Class(c) => write!(f, "{:?}", c),
            Value::Object(o) => write!(f, "{:?}", o),
            Value::Module(m) => write!(f, "{:?}", m),
            Value::Cell(c) => write!(f, "{:?}", c),
            Value::StaticMethod(inner) => write!(f, "staticmethod({:?})", inner),
            Value::ClassMethod(inner) => write!(f, "classmethod({:?})", inner),
            Value::Property(inner) => write!(f, "property({:?})", inner),
        }
    }
}

/// Key: hashable subset of Value for dict keys and set elements
///
/// Floats hash by bit pattern, so `0.0` and `-0.0` are distinct keys.
/// Lists, dicts, sets and every reference kind are unhashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Rc<[Key]>),
}

impl Key {
    /// Try to convert a Value to a Key
    /// Returns None for unhashable values
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::None => Some(Key::None),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Float(x) => Some(Key::Float(x.to_bits())),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Bytes(data) => Some(Key::Bytes(data.clone())),
            Value::Tuple(items) => {
                let keys: Option<Vec<Key>> = items.iter().map(Key::from_value).collect();
                keys.map(|k| Key::Tuple(Rc::from(k)))
            }
            _ => None,
        }
    }

    /// Convert Key back to Value
    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Bytes(data) => Value::Bytes(data.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}
