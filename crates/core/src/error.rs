//! Interpreter errors
//!
//! Every failure the interpreter can hit while running a code block is a
//! `RuntimeError` variant. Nothing in this crate panics on bad input: bad
//! bytecode, unknown names and arithmetic faults all surface through
//! `Result`.

use std::fmt;

/// A specialized `Result` for object-model and interpreter operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Error raised while executing or calling into the object model
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A global (or module attribute) lookup failed
    NameError(String),
    /// Operation applied to a value of the wrong type, or bad call arity
    TypeError(String),
    /// Attribute missing on an object, class or module
    AttributeError(String),
    /// Subscript out of range or missing dict key
    IndexError(String),
    /// Local variable read before assignment
    UnboundLocal(String),
    /// Closure cell read while still empty
    UnboundCell(String),
    /// Division or modulo by zero
    ZeroDivision,
    /// Checked integer arithmetic overflowed
    Overflow,
    /// Malformed bytecode (unknown opcode, bad operand, truncated stream)
    InvalidBytecode(String),
    /// Call depth guard tripped
    RecursionLimit(usize),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NameError(name) => write!(f, "name '{}' is not defined", name),
            RuntimeError::TypeError(msg) => write!(f, "type error: {}", msg),
            RuntimeError::AttributeError(msg) => write!(f, "attribute error: {}", msg),
            RuntimeError::IndexError(msg) => write!(f, "index error: {}", msg),
            RuntimeError::UnboundLocal(name) => {
                write!(f, "local variable '{}' referenced before assignment", name)
            }
            RuntimeError::UnboundCell(name) => {
                write!(f, "free variable '{}' referenced before assignment", name)
            }
            RuntimeError::ZeroDivision => write!(f, "division by zero"),
            RuntimeError::Overflow => write!(f, "integer overflow"),
            RuntimeError::InvalidBytecode(msg) => write!(f, "invalid bytecode: {}", msg),
            RuntimeError::RecursionLimit(limit) => {
                write!(f, "maximum call depth exceeded ({})", limit)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
