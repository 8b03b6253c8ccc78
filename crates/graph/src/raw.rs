//! The `(kind, fields)` exchange shape
//!
//! This is what the walker produces and the rebuilder consumes. Format
//! adapters render it to and parse it from concrete syntax.
//!
//! A `RawValue` is either a literal scalar, a list of raw values, a tagged
//! node with ordered named fields, or a placeholder standing for a function
//! or class that is still being built.

use crate::kind::Kind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered field mapping of a node
pub type Fields = IndexMap<String, RawValue>;

/// Field names shared by the walker and the rebuilder
pub mod field {
    pub const VALUE: &str = "value";
    pub const ITEMS: &str = "items";
    pub const ENTRIES: &str = "entries";
    pub const VALUES: &str = "values";
    pub const NAME: &str = "name";
    pub const QUALNAME: &str = "qualname";
    pub const CODE: &str = "code";
    pub const GLOBALS: &str = "globals";
    pub const DEFAULTS: &str = "defaults";
    pub const CLOSURE: &str = "closure";
    pub const FUNCTION: &str = "function";
    pub const RECEIVER: &str = "receiver";
    pub const BASES: &str = "bases";
    pub const ATTRS: &str = "attrs";
    pub const CLASS: &str = "class";

    // Code block fields
    pub const ARGCOUNT: &str = "argcount";
    pub const POSONLYARGCOUNT: &str = "posonlyargcount";
    pub const KWONLYARGCOUNT: &str = "kwonlyargcount";
    pub const NLOCALS: &str = "nlocals";
    pub const STACKSIZE: &str = "stacksize";
    pub const FLAGS: &str = "flags";
    pub const CODESTRING: &str = "codestring";
    pub const CONSTS: &str = "consts";
    pub const NAMES: &str = "names";
    pub const VARNAMES: &str = "varnames";
    pub const FILENAME: &str = "filename";
    pub const FIRSTLINENO: &str = "firstlineno";
    pub const FREEVARS: &str = "freevars";
    pub const CELLVARS: &str = "cellvars";
}

/// Placeholder for a function or class under construction
///
/// `depth` counts enclosing in-progress functions and classes, innermost
/// first: `0` is the value whose fields contain the placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelfRef {
    pub depth: usize,
}

impl SelfRef {
    pub const SELF: SelfRef = SelfRef { depth: 0 };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: Kind,
    pub fields: Fields,
}

impl Node {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            fields: Fields::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, name: &str, value: RawValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Str(String),
    List(Vec<RawValue>),
    Node(Node),
    Placeholder(SelfRef),
}

impl RawValue {
    pub fn is_literal(&self) -> bool {
        !matches!(
            self,
            RawValue::List(_) | RawValue::Node(_) | RawValue::Placeholder(_)
        )
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            RawValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Number of placeholders anywhere below this value
    pub fn placeholder_count(&self) -> usize {
        match self {
            RawValue::Placeholder(_) => 1,
            RawValue::List(items) => items.iter().map(RawValue::placeholder_count).sum(),
            RawValue::Node(node) => node.fields.values().map(RawValue::placeholder_count).sum(),
            _ => 0,
        }
    }
}

impl From<Node> for RawValue {
    fn from(node: Node) -> Self {
        RawValue::Node(node)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Str(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Int(n)
    }
}

impl From<u32> for RawValue {
    fn from(n: u32) -> Self {
        RawValue::Int(i64::from(n))
    }
}
