//! Binder configuration
//!
//! Settings live in a TOML file (conventionally `reqbind.toml`):
//!
//! ```toml
//! max_memory = 33554432   # multipart bytes kept in memory
//! spill_dir = "/var/tmp"  # where larger uploads are written
//! ```
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`REQBIND_MAX_MEMORY`, `REQBIND_SPILL_DIR`)
//! 2. Config file
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};

/// 32 MiB, the in-memory cap for multipart bodies
pub const DEFAULT_MAX_MEMORY: u64 = 32 << 20;

pub const ENV_MAX_MEMORY: &str = "REQBIND_MAX_MEMORY";
pub const ENV_SPILL_DIR: &str = "REQBIND_SPILL_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BinderConfig {
    /// Multipart bytes buffered in memory before file parts spill to disk
    pub max_memory: u64,

    /// Directory for spilled file parts (system temp dir when unset)
    pub spill_dir: Option<PathBuf>,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
            spill_dir: None,
        }
    }
}

impl BinderConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BindError::Config {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from file
    ///
    /// Returns the default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| BindError::Config {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;

        Self::from_toml_str(&content)
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over file values. An unparsable
    /// `REQBIND_MAX_MEMORY` is an error rather than silently ignored.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(ENV_MAX_MEMORY) {
            if !raw.is_empty() {
                self.max_memory = raw.trim().parse().map_err(|e| BindError::Config {
                    reason: format!("{} must be a byte count: {}", ENV_MAX_MEMORY, e),
                })?;
            }
        }

        if let Ok(dir) = std::env::var(ENV_SPILL_DIR) {
            if !dir.is_empty() {
                self.spill_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(self)
    }
}
