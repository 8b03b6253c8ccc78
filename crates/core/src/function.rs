//! Functions, closure cells and bound methods
//!
//! A function is a code block plus the environment it runs in:
//! - a shared globals table (all functions of one module share it)
//! - default argument values
//! - closure cells, one per entry of `cellvars` then `freevars`
//!
//! Cells are shared `Rc<Cell>` slots. A cell may be empty, which is how a
//! function refers to itself before it exists: the cell is created empty,
//! the function is built over it, and the cell is filled afterwards.

use crate::code::CodeBlock;
use crate::error::Result;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared global namespace of a module
pub type Globals = Rc<RefCell<IndexMap<String, Value>>>;

/// Create an empty globals table
pub fn new_globals() -> Globals {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// Closure cell: a single shared, possibly empty, storage slot
#[derive(Default)]
pub struct Cell {
    contents: RefCell<Option<Value>>,
}

impl Cell {
    pub fn new(value: Value) -> Rc<Cell> {
        Rc::new(Cell {
            contents: RefCell::new(Some(value)),
        })
    }

    /// A cell with no contents yet
    pub fn empty() -> Rc<Cell> {
        Rc::new(Cell::default())
    }

    pub fn get(&self) -> Option<Value> {
        self.contents.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.contents.borrow_mut() = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        self.contents.borrow().is_none()
    }
}

impl fmt::Debug for Cell {
    // Contents are not printed: a cell is where a function points back at itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.contents.borrow() {
            Some(v) => write!(f, "<cell: {}>", v.type_name()),
            None => write!(f, "<cell: empty>"),
        }
    }
}

/// A callable bound to a code block
pub struct Function {
    pub name: String,
    pub qualname: String,
    pub code: Rc<CodeBlock>,
    pub globals: Globals,
    pub defaults: Vec<Value>,
    pub closure: Vec<Rc<Cell>>,
}

impl Function {
    /// Function over `code` with no defaults and no closure; named after the code
    pub fn new(code: Rc<CodeBlock>, globals: Globals) -> Self {
        Self {
            name: code.name.clone(),
            qualname: code.name.clone(),
            code,
            globals,
            defaults: Vec::new(),
            closure: Vec::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<Value>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_closure(mut self, closure: Vec<Rc<Cell>>) -> Self {
        self.closure = closure;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_qualname(mut self, qualname: &str) -> Self {
        self.qualname = qualname.to_string();
        self
    }

    /// Wrap and bind the function under its own name in its globals table
    ///
    /// This is what a module-level `def` does, and what makes plain
    /// recursion through a global lookup work.
    pub fn define(self) -> Value {
        let name = self.name.clone();
        let globals = self.globals.clone();
        let value = Value::function(self);
        globals.borrow_mut().insert(name, value.clone());
        value
    }

    /// Structural comparison that never follows globals or cells
    pub fn shape_eq(&self, other: &Function) -> bool {
        self.name == other.name
            && self.qualname == other.qualname
            && self.code == other.code
            && self.defaults == other.defaults
            && self.closure.len() == other.closure.len()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.qualname)
    }
}

/// A function paired with its receiver
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub function: Value,
    pub receiver: Value,
}

impl BoundMethod {
    pub fn new(function: Value, receiver: Value) -> Value {
        Value::Method(Rc::new(BoundMethod { function, receiver }))
    }
}

/// Signature of a builtin implemented in Rust
pub type NativeFn = fn(&[Value]) -> Result<Value>;

/// A builtin implemented in Rust
///
/// Natives have no code block to walk, so they cannot be serialized. Class
/// attributes holding natives are dropped by the serializer; a native
/// anywhere else is reported as unsupported.
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &str, func: NativeFn) -> Value {
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func,
        }))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}
