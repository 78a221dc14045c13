//! Storage node configuration

use dtranx_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default listen address (the original deployment port)
pub const DEFAULT_LISTEN: &str = "127.0.0.1:60000";

/// Default number of versions retained per key
pub const DEFAULT_MAX_VERSIONS: usize = 8;

/// Storage node settings
///
/// # Example
///
/// ```
/// use dtranx_storage::NodeConfig;
///
/// let config = NodeConfig::from_toml_str(r#"
///     listen = "0.0.0.0:7000"
///     max_versions = 16
/// "#).unwrap();
/// assert_eq!(config.max_versions, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the node server listens on
    pub listen: String,
    /// Versions retained per key for snapshot reads
    pub max_versions: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            max_versions: DEFAULT_MAX_VERSIONS,
        }
    }
}

impl NodeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address
    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.listen = addr.into();
        self
    }

    /// Set the number of versions retained per key
    pub fn max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_versions == 0 {
            return Err(Error::Config("max_versions must be at least 1".to_string()));
        }
        if self.listen.is_empty() {
            return Err(Error::Config("listen address must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: NodeConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}
