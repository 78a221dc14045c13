//! Client configuration

use dtranx_concurrency::RetryPolicy;
use dtranx_core::{Error, NodeAddr, Result};
use dtranx_durability::DurabilityMode;
use dtranx_wire::SessionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::locator::DEFAULT_VIRTUAL_NODES;

/// Client settings
///
/// All fields have defaults, so a TOML file only needs the node list:
///
/// ```
/// use dtranx_client::ClientConfig;
///
/// let config = ClientConfig::from_toml_str(r#"
///     nodes = ["10.0.0.1:60000", "10.0.0.2:60000"]
///     request_timeout_ms = 500
/// "#).unwrap();
/// assert_eq!(config.nodes.len(), 2);
/// assert_eq!(config.request_timeout_ms, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Storage nodes, one per partition
    pub nodes: Vec<NodeAddr>,
    /// Ring points per node
    pub virtual_nodes: usize,
    /// Bound on establishing a session
    pub connect_timeout_ms: u64,
    /// Bound on each request
    pub request_timeout_ms: u64,
    /// Extra attempts to deliver a commit or abort decision
    pub commit_retries: u32,
    /// Pause between delivery attempts
    pub retry_backoff_ms: u64,
    /// Decision log durability
    pub durability: DurabilityMode,
    /// Decision log file; required unless `durability` is `none`
    pub log_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 2_000,
            commit_retries: 3,
            retry_backoff_ms: 20,
            durability: DurabilityMode::None,
            log_path: None,
        }
    }
}

impl ClientConfig {
    /// Configuration with default settings and no nodes
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node list
    pub fn nodes<I, A>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddr>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the ring points per node
    pub fn virtual_nodes(mut self, virtual_nodes: usize) -> Self {
        self.virtual_nodes = virtual_nodes;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set decision delivery retries
    pub fn commit_retries(mut self, retries: u32) -> Self {
        self.commit_retries = retries;
        self
    }

    /// Set the pause between delivery attempts
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Log decisions to `path` with `mode`
    pub fn decision_log(mut self, path: impl Into<PathBuf>, mode: DurabilityMode) -> Self {
        self.log_path = Some(path.into());
        self.durability = mode;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Config("no known partition: node list is empty".into()));
        }
        if self.virtual_nodes == 0 {
            return Err(Error::Config("virtual_nodes must be at least 1".into()));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be greater than 0".into()));
        }
        if self.durability.requires_file() && self.log_path.is_none() {
            return Err(Error::Config(format!(
                "durability '{}' requires log_path",
                self.durability
            )));
        }
        Ok(())
    }

    /// Socket timeouts for TCP sessions
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from_millis(self.connect_timeout_ms, self.request_timeout_ms)
    }

    /// Decision delivery policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.commit_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ClientConfig =
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
