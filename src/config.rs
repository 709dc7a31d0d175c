//! Process-wide configuration
//!
//! [`RpcConfig`] collects the knobs that would otherwise be globals: output
//! validation, exception detail exposure, batch limits, and the input size
//! guard. A snapshot is owned by each built router, so two routers in the
//! same process can run with different settings.
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::RpcConfig;
//!
//! let config = RpcConfig::new()
//!     .with_max_batch_size(25)
//!     .with_call_timeout_ms(5_000)
//!     .with_include_exception_details(cfg!(debug_assertions));
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration owned by a built router.
///
/// All fields have defaults that let the core function out of the box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Validate handler output against the declared output schema (default: true)
    pub validate_output: bool,
    /// Attach trapped panic payloads to INTERNAL_ERROR responses (default: false)
    pub include_exception_details: bool,
    /// Maximum number of calls in a single batch (default: 50)
    pub max_batch_size: usize,
    /// Maximum in-flight calls during batch fan-out (default: 10)
    pub max_concurrency: usize,
    /// Per-call deadline during batch execution, in milliseconds (default: 30_000)
    pub call_timeout_ms: u64,
    /// Maximum raw input size in bytes (default: 1 MiB)
    pub max_input_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            validate_output: true,
            include_exception_details: false,
            max_batch_size: 50,
            max_concurrency: 10,
            call_timeout_ms: 30_000,
            max_input_size: 1024 * 1024,
        }
    }
}

impl RpcConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable output validation.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_validate_output(mut self, enabled: bool) -> Self {
        self.validate_output = enabled;
        self
    }

    /// Enable or disable exception details on INTERNAL_ERROR responses.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_include_exception_details(mut self, enabled: bool) -> Self {
        self.include_exception_details = enabled;
        self
    }

    /// Set the maximum batch size.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the maximum batch fan-out concurrency.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    /// Set the per-call batch deadline in milliseconds.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum raw input size in bytes.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            warn!("RpcConfig validation failed: max_batch_size must be greater than 0");
            return Err("max_batch_size must be greater than 0".to_string());
        }
        if self.max_concurrency == 0 {
            warn!("RpcConfig validation failed: max_concurrency must be greater than 0");
            return Err("max_concurrency must be greater than 0".to_string());
        }
        if self.call_timeout_ms == 0 {
            warn!("RpcConfig validation failed: call_timeout_ms must be greater than 0");
            return Err("call_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RpcConfig::default();
        assert!(config.validate_output);
        assert!(!config.include_exception_details);
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.call_timeout_ms, 30_000);
        assert_eq!(config.max_input_size, 1024 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = RpcConfig::new()
            .with_validate_output(false)
            .with_max_batch_size(5)
            .with_max_concurrency(2)
            .with_call_timeout_ms(100)
            .with_include_exception_details(true);
        assert!(!config.validate_output);
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.call_timeout_ms, 100);
        assert!(config.include_exception_details);
    }

    #[test]
    fn test_config_validation() {
        assert!(RpcConfig::default().validate().is_ok());
        assert!(RpcConfig::new().with_max_batch_size(0).validate().is_err());
        assert!(RpcConfig::new().with_max_concurrency(0).validate().is_err());
        assert!(RpcConfig::new().with_call_timeout_ms(0).validate().is_err());
    }
}
