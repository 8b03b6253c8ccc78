//! Errors raised while walking, rebuilding or encoding a graph
//!
//! Every error is fatal to the call that raised it: there is no partial
//! result and no retry inside this crate.

use crate::kind::Kind;
use std::fmt;
use std::io;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone)]
pub enum GraphError {
    /// A node is structurally invalid for its declared kind
    MalformedGraph {
        /// The declared kind, if the tag itself was recognized
        kind: Option<Kind>,
        /// Offending field, where one can be named
        field: Option<String>,
        message: String,
    },
    /// A module or class reference cannot be resolved here
    UnresolvableReference(String),
    /// The recursion guard tripped
    DepthExceeded { limit: usize },
    /// A value has no representation in the exchange shape
    UnsupportedValue(String),
    /// A format adapter could not encode or decode
    Format(String),
    Io(Arc<io::Error>),
}

impl GraphError {
    pub fn malformed(kind: Kind, field: &str, message: impl Into<String>) -> Self {
        GraphError::MalformedGraph {
            kind: Some(kind),
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn missing_field(kind: Kind, field: &str) -> Self {
        Self::malformed(kind, field, "missing required field")
    }

    pub fn unknown_kind(tag: &str) -> Self {
        GraphError::MalformedGraph {
            kind: None,
            field: None,
            message: format!("unknown kind tag '{}'", tag),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::MalformedGraph {
                kind,
                field,
                message,
            } => {
                write!(f, "Malformed graph")?;
                if let Some(kind) = kind {
                    write!(f, " in {} node", kind)?;
                }
                if let Some(field) = field {
                    write!(f, ", field '{}'", field)?;
                }
                write!(f, ": {}", message)
            }
            GraphError::UnresolvableReference(name) => {
                write!(f, "Unresolvable reference: {}", name)
            }
            GraphError::DepthExceeded { limit } => {
                write!(f, "Graph nesting exceeds the depth limit of {}", limit)
            }
            GraphError::UnsupportedValue(what) => write!(f, "Unsupported value: {}", what),
            GraphError::Format(msg) => write!(f, "Format error: {}", msg),
            GraphError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(e: io::Error) -> Self {
        GraphError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            return GraphError::Io(Arc::new(io::Error::other(e.to_string())));
        }
        GraphError::Format(format!("json: {}", e))
    }
}

impl From<bincode::Error> for GraphError {
    fn from(e: bincode::Error) -> Self {
        match *e {
            bincode::ErrorKind::Io(io) => GraphError::Io(Arc::new(io)),
            other => GraphError::Format(format!("binary: {}", other)),
        }
    }
}
