//! Kernel configuration.
//!
//! Knobs for the message limits a kernel enforces and the default execution
//! deadline it applies to started processes. All fields have serde defaults,
//! so a partial configuration file fills in the rest.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quark_core::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_MESSAGE_HANDLES, DEFAULT_MAX_NAME_LEN};

/// Errors from kernel configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid kernel config: {0}")]
    Invalid(String),
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_max_message_handles() -> usize {
    DEFAULT_MAX_MESSAGE_HANDLES
}

fn default_max_name_len() -> usize {
    DEFAULT_MAX_NAME_LEN
}

/// Configuration for a kernel instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Largest payload a single channel message may carry, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Most handles a single channel message may carry.
    #[serde(default = "default_max_message_handles")]
    pub max_message_handles: usize,

    /// Longest object name, in bytes. Longer names are silently truncated.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    /// Execution deadline applied to every started process, in milliseconds.
    /// `None` leaves process execution unbounded.
    #[serde(default)]
    pub process_deadline_ms: Option<u64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            max_message_handles: default_max_message_handles(),
            max_name_len: default_max_name_len(),
            process_deadline_ms: None,
        }
    }
}

impl KernelConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be positive".to_string(),
            ));
        }

        if self.max_name_len == 0 {
            return Err(ConfigError::Invalid(
                "max_name_len must be positive".to_string(),
            ));
        }

        if self.process_deadline_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "process_deadline_ms must be positive when set".to_string(),
            ));
        }

        Ok(())
    }
}
