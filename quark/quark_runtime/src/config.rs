//! Configuration for the Quark runtime.
//!
//! Handles loading and validating runtime configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use quark_kernel::KernelConfig;

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the program the root process is created from
    #[serde(default = "default_init_program")]
    pub init_program: String,

    /// Shutdown grace period (seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Kernel knobs
    #[serde(default)]
    pub kernel: KernelConfig,
}

fn default_init_program() -> String {
    "init".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            init_program: default_init_program(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            kernel: KernelConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file.
    ///
    /// With no path, or a path that does not exist, the defaults are used.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());

            if !path.exists() {
                warn!("Configuration file not found: {}", path.display());
                return Ok(config);
            }

            let content = fs::read_to_string(path).await.with_context(|| {
                format!("Failed to read configuration file: {}", path.display())
            })?;

            config = serde_json::from_str(&content).with_context(|| {
                format!("Failed to parse configuration file: {}", path.display())
            })?;
        } else {
            info!("No configuration file specified, using defaults");
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.init_program.is_empty() {
            return Err(ConfigError::Invalid("init program name cannot be empty".to_string()).into());
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Invalid("shutdown timeout cannot be zero".to_string()).into());
        }

        self.kernel.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_config() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path();

        let config_json = r#"
        {
            "init_program": "supervisor",
            "shutdown_timeout_secs": 5,
            "kernel": {
                "max_message_bytes": 1024,
                "process_deadline_ms": 500
            }
        }
        "#;

        fs::write(path, config_json).await.unwrap();

        let config = RuntimeConfig::load(Some(path)).await.unwrap();
        assert_eq!(config.init_program, "supervisor");
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert_eq!(config.kernel.max_message_bytes, 1024);
        assert_eq!(config.kernel.process_deadline_ms, Some(500));

        // Fields the file omits keep their defaults
        assert_eq!(
            config.kernel.max_message_handles,
            KernelConfig::default().max_message_handles
        );
    }

    #[tokio::test]
    async fn test_default_config() {
        let config = RuntimeConfig::load(None).await.unwrap();
        assert_eq!(config.init_program, "init");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.kernel.process_deadline_ms, None);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let config = RuntimeConfig::load(Some(Path::new("/no/such/config.json")))
            .await
            .unwrap();
        assert_eq!(config.init_program, "init");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path();

        fs::write(path, r#"{"shutdown_timeout_secs": 0}"#)
            .await
            .unwrap();

        assert!(RuntimeConfig::load(Some(path)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_kernel_section_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path();

        fs::write(path, r#"{"kernel": {"max_message_bytes": 0}}"#)
            .await
            .unwrap();

        assert!(RuntimeConfig::load(Some(path)).await.is_err());
    }
}
