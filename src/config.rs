//! Coordinator Configuration
//!
//! Loaded from a JSON file, validated once, immutable afterwards.
//!
//! ```json
//! {
//!   "node_id": "node-1",
//!   "lock_timeout_ms": 5000,
//!   "notify_on_master_removal": true,
//!   "check_interval_ms": 30000,
//!   "audit_capacity": 1024,
//!   "audit_log_path": "/var/log/mastership/audit.log"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mastership::NodeId;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings of one coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Identity of the local node (required)
    pub node_id: NodeId,

    /// Bound on entering a per-resource critical section
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Publish MASTER_VACATED when a master entry disappears
    #[serde(default = "default_notify_on_master_removal")]
    pub notify_on_master_removal: bool,

    /// Period of the background mastership check
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Audit records retained in memory
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,

    /// Optional JSON-lines audit file
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}
fn default_notify_on_master_removal() -> bool {
    true
}
fn default_check_interval_ms() -> u64 {
    30000
}
fn default_audit_capacity() -> usize {
    1024
}

impl CoordinatorConfig {
    /// Configuration with defaults for everything but the node identity.
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            lock_timeout_ms: default_lock_timeout_ms(),
            notify_on_master_removal: default_notify_on_master_removal(),
            check_interval_ms: default_check_interval_ms(),
            audit_capacity: default_audit_capacity(),
            audit_log_path: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_removal_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_master_removal = enabled;
        self
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON document
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: CoordinatorConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }

        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be > 0".into()));
        }

        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid("check_interval_ms must be > 0".into()));
        }

        if self.audit_capacity == 0 {
            return Err(ConfigError::Invalid("audit_capacity must be > 0".into()));
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_applied() {
        let config = CoordinatorConfig::from_json(r#"{"node_id":"n1"}"#).unwrap();
        assert_eq!(config.node_id, NodeId::from("n1"));
        assert_eq!(config.lock_timeout(), Duration::from_millis(5000));
        assert!(config.notify_on_master_removal);
        assert_eq!(config.check_interval(), Duration::from_secs(30));
        assert_eq!(config.audit_capacity, 1024);
        assert!(config.audit_log_path.is_none());
    }

    #[test]
    fn test_missing_node_id_rejected() {
        let err = CoordinatorConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_node_id_rejected() {
        let err = CoordinatorConfig::from_json(r#"{"node_id":"  "}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let err =
            CoordinatorConfig::from_json(r#"{"node_id":"n1","lock_timeout_ms":0}"#).unwrap_err();
        assert!(err.to_string().contains("lock_timeout_ms"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = CoordinatorConfig::new("n2")
            .with_lock_timeout(Duration::from_millis(25))
            .with_removal_notifications(false);
        assert_eq!(config.lock_timeout_ms, 25);
        assert!(!config.notify_on_master_removal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"node_id":"n3","check_interval_ms":100,"notify_on_master_removal":false}}"#
        )
        .unwrap();

        let config = CoordinatorConfig::load(file.path()).unwrap();
        assert_eq!(config.node_id.as_str(), "n3");
        assert_eq!(config.check_interval(), Duration::from_millis(100));
        assert!(!config.notify_on_master_removal);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CoordinatorConfig::load(Path::new("/nonexistent/mastership.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
