//! Walker and rebuilder configuration
//!
//! Built in code through the `with_*` methods, or loaded from TOML:
//!
//! ```toml
//! max_depth = 512
//! share_classes = false
//! pretty = true
//! ```

use serde::Deserialize;

/// Default nesting limit for walking and rebuilding
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Deepest nesting the walker or rebuilder will descend to
    pub max_depth: usize,
    /// Reuse one class for structurally identical class nodes in a rebuild
    pub share_classes: bool,
    /// Indented output from text-based format adapters
    pub pretty: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            share_classes: true,
            pretty: false,
        }
    }
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_share_classes(mut self, share: bool) -> Self {
        self.share_classes = share;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Parse from a TOML document; missing keys keep their defaults
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse graph config: {}", e))
    }
}
