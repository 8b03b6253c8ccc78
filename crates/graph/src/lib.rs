//! objgraph: structural object-graph serialization
//!
//! Turns live `objgraph_core` values (functions with closures and globals,
//! classes, instances, containers, generators) into a tagged tree of
//! `(kind, fields)` nodes and back.
//!
//! # Pieces
//!
//! - `walker`: `classify_and_extract`, value to `(kind, fields)`
//! - `rebuilder`: `construct`, `(kind, fields)` to value, closing
//!   self-references by backpatching
//! - `raw`: the exchange shape both sides agree on
//! - `format`: JSON, binary and text adapters for the exchange shape
//! - `config`: depth limit and rebuild options
//!
//! # Limitations
//!
//! - Aliasing is not preserved: two references to one mutable object come
//!   back as two independent copies. Only a function's or class's reference
//!   to itself (or to an enclosing function or class) keeps its identity.
//! - Walking a generator drains it.
//! - Input is trusted. Rebuilding runs no code, but the rebuilt functions
//!   run whatever bytecode they carry.
//!
//! # Example
//!
//! ```
//! use objgraph::{Codec, Format};
//! use objgraph_core::Value;
//!
//! let codec = Codec::default();
//! let value = Value::tuple(vec![Value::Int(1), Value::str("two")]);
//! let bytes = codec.dumps(&value, Format::Json).unwrap();
//! assert_eq!(codec.loads(&bytes, Format::Json).unwrap(), value);
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod kind;
pub mod raw;
pub mod rebuilder;
pub mod walker;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use format::Format;
pub use kind::Kind;
pub use raw::{Fields, Node, RawValue, SelfRef};
pub use rebuilder::{Rebuilder, construct};
pub use walker::{Walker, classify_and_extract};

use objgraph_core::{ModuleRegistry, Value};
use std::io::{Read, Write};
use tracing::debug;

/// Serializer front end: a configuration plus the modules available for
/// rebuilding
#[derive(Debug)]
pub struct Codec {
    config: GraphConfig,
    modules: ModuleRegistry,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(GraphConfig::default(), ModuleRegistry::with_stdlib())
    }
}

impl Codec {
    pub fn new(config: GraphConfig, modules: ModuleRegistry) -> Self {
        Self { config, modules }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn to_raw(&self, value: &Value) -> Result<RawValue> {
        Walker::new(&self.config).walk(value)
    }

    pub fn from_raw(&self, raw: &RawValue) -> Result<Value> {
        Rebuilder::new(&self.config, &self.modules).resolve(raw)
    }

    pub fn dumps(&self, value: &Value, format: Format) -> Result<Vec<u8>> {
        let raw = self.to_raw(value)?;
        let bytes = format.encode(&raw, self.config.pretty)?;
        debug!(%format, bytes = bytes.len(), "serialized graph");
        Ok(bytes)
    }

    pub fn loads(&self, bytes: &[u8], format: Format) -> Result<Value> {
        let raw = format.decode(bytes, self.config.max_depth)?;
        self.from_raw(&raw)
    }

    pub fn dump(&self, value: &Value, format: Format, mut writer: impl Write) -> Result<()> {
        let bytes = self.dumps(value, format)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(&self, mut reader: impl Read, format: Format) -> Result<Value> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.loads(&bytes, format)
    }
}
