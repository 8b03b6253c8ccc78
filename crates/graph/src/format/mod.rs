//! Format adapters
//!
//! Each adapter renders the raw exchange shape to concrete syntax and
//! parses it back. Adapters never see live values.
//!
//! - `json`: JSON text, the interchange format
//! - `binary`: compact bincode encoding
//! - `text`: one-way human-readable rendering for inspection

pub mod binary;
pub mod json;
mod nesting;
pub mod text;

use crate::error::{GraphError, Result};
use crate::raw::RawValue;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A round-trippable encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Binary,
}

impl Format {
    /// Guess from a file extension (`.json`, `.bin`)
    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "bin" | "objgraph" => Some(Format::Binary),
            _ => None,
        }
    }

    pub fn encode(self, raw: &RawValue, pretty: bool) -> Result<Vec<u8>> {
        match self {
            Format::Json => json::to_vec(raw, pretty),
            Format::Binary => binary::to_bytes(raw),
        }
    }

    /// Parse `bytes`, refusing input nested deeper than a graph within
    /// `max_depth` could be
    pub fn decode(self, bytes: &[u8], max_depth: usize) -> Result<RawValue> {
        match self {
            Format::Json => json::from_slice(bytes, max_depth),
            Format::Binary => binary::from_bytes(bytes, max_depth),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for Format {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "binary" | "bin" | "bincode" => Ok(Format::Binary),
            other => Err(GraphError::Format(format!("unknown format '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("g.json")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("g.bin")), Some(Format::Binary));
        assert_eq!(Format::from_path(Path::new("g.txt")), None);
        assert_eq!(Format::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<Format>().ok(), Some(Format::Json));
        assert_eq!("bincode".parse::<Format>().ok(), Some(Format::Binary));
        assert!("yaml".parse::<Format>().is_err());
    }
}
