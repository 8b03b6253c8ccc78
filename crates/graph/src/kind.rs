//! The closed set of kind tags

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discriminator of a serialized node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Primitive,
    Sequence,
    Tuple,
    Mapping,
    Set,
    FrozenSet,
    Bytes,
    Generator,
    Code,
    Function,
    Method,
    Class,
    Object,
    Module,
    Cell,
    StaticMethod,
    ClassMethod,
    Property,
}

impl Kind {
    pub const ALL: [Kind; 18] = [
        Kind::Primitive,
        Kind::Sequence,
        Kind::Tuple,
        Kind::Mapping,
        Kind::Set,
        Kind::FrozenSet,
        Kind::Bytes,
        Kind::Generator,
        Kind::Code,
        Kind::Function,
        Kind::Method,
        Kind::Class,
        Kind::Object,
        Kind::Module,
        Kind::Cell,
        Kind::StaticMethod,
        Kind::ClassMethod,
        Kind::Property,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Primitive => "primitive",
            Kind::Sequence => "sequence",
            Kind::Tuple => "tuple",
            Kind::Mapping => "mapping",
            Kind::Set => "set",
            Kind::FrozenSet => "frozenset",
            Kind::Bytes => "bytes",
            Kind::Generator => "generator",
            Kind::Code => "code",
            Kind::Function => "function",
            Kind::Method => "method",
            Kind::Class => "class",
            Kind::Object => "object",
            Kind::Module => "module",
            Kind::Cell => "cell",
            Kind::StaticMethod => "staticmethod",
            Kind::ClassMethod => "classmethod",
            Kind::Property => "property",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GraphError::unknown_kind(s))
    }
}
