//! Registry configuration loaded from a TOML file and `TIDI_*` environment variables

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::storage::StorageMode;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TIDI";

/// Configuration for a [`Registry`](crate::Registry)
///
/// ```toml
/// storage = "shared"
/// ban_builtin_types = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How entries are shared between threads
    pub storage: StorageMode,
    /// Reject primitive and builtin key types
    pub ban_builtin_types: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::PerThread,
            ban_builtin_types: true,
        }
    }
}

impl RegistryConfig {
    /// Load from an optional file, then apply `TIDI_STORAGE` / `TIDI_BAN_BUILTIN_TYPES`.
    ///
    /// A given path must exist. Environment values override file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading registry config file");
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from the environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}
