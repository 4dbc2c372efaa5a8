//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating VaultFS settings
//! from JSON files and environment variables. Key material is validated once
//! at startup; a missing or malformed key/IV is fatal, never a runtime error.
//!
//! ## Environment Variables
//!
//! - `VAULTFS_KEY`: hex-encoded 32-byte encryption key (mandatory)
//! - `VAULTFS_IV`: hex-encoded 16-byte initialization vector (mandatory)
//! - `VAULTFS_UPLOAD_DIR`: override upload directory path
//! - `VAULTFS_CONFIG`: override config file path

use crate::cipher::CipherContext;
use crate::error::VaultFsError;
use crate::file_ops::RetrieveLimits;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_KEY: &str = "VAULTFS_KEY";
pub const ENV_IV: &str = "VAULTFS_IV";
pub const ENV_UPLOAD_DIR: &str = "VAULTFS_UPLOAD_DIR";
pub const ENV_CONFIG_PATH: &str = "VAULTFS_CONFIG";

/// Default retrieval size ceiling (50 MiB)
pub const DEFAULT_MAX_RETRIEVE_BYTES: u64 = 50 * 1024 * 1024;
/// Default retrieval wall-clock budget in seconds
pub const DEFAULT_RETRIEVE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub upload_dir: String,
    #[serde(default)]
    pub key_hex: String,
    #[serde(default)]
    pub iv_hex: String,
    #[serde(default = "default_max_retrieve_bytes")]
    pub max_retrieve_bytes: u64,
    #[serde(default = "default_retrieve_timeout_secs")]
    pub retrieve_timeout_secs: u64,
}

fn default_max_retrieve_bytes() -> u64 {
    DEFAULT_MAX_RETRIEVE_BYTES
}

fn default_retrieve_timeout_secs() -> u64 {
    DEFAULT_RETRIEVE_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
            key_hex: String::new(),
            iv_hex: String::new(),
            max_retrieve_bytes: DEFAULT_MAX_RETRIEVE_BYTES,
            retrieve_timeout_secs: DEFAULT_RETRIEVE_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self, VaultFsError> {
        let s = fs::read_to_string(path)
            .map_err(|e| VaultFsError::config(format!("reading config file {path}: {e}")))?;
        let mut config: Config = serde_json::from_str(&s)
            .map_err(|e| VaultFsError::config(format!("parsing config file {path}: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self, VaultFsError> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .map_err(|e| VaultFsError::config(format!("reading config file {p}: {e}")))?;
                serde_json::from_str(&s)
                    .map_err(|e| VaultFsError::config(format!("parsing config file {p}: {e}")))?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    fn apply_env_overrides(&mut self) {
        if let Ok(upload_dir) = env::var(ENV_UPLOAD_DIR) {
            debug!(upload_dir = %upload_dir, "overriding upload_dir from environment");
            self.upload_dir = upload_dir;
        }

        if let Ok(key_hex) = env::var(ENV_KEY) {
            debug!("overriding encryption key from environment");
            self.key_hex = key_hex;
        }

        if let Ok(iv_hex) = env::var(ENV_IV) {
            debug!("overriding IV from environment");
            self.iv_hex = iv_hex;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), VaultFsError> {
        if self.upload_dir.trim().is_empty() {
            return Err(VaultFsError::config("upload_dir cannot be empty"));
        }

        if self.key_hex.trim().is_empty() {
            return Err(VaultFsError::config(format!(
                "no encryption key configured - set {ENV_KEY} or key_hex in the config file"
            )));
        }

        if self.iv_hex.trim().is_empty() {
            return Err(VaultFsError::config(format!(
                "no IV configured - set {ENV_IV} or iv_hex in the config file"
            )));
        }

        if self.max_retrieve_bytes == 0 {
            return Err(VaultFsError::config("max_retrieve_bytes cannot be zero"));
        }

        if env::var(ENV_KEY).is_err() {
            warn!("encryption key loaded from config file - prefer the {} environment variable", ENV_KEY);
        }

        if self.upload_dir.contains("..") {
            warn!("upload_dir contains '..' - consider using absolute paths");
        }

        Ok(())
    }

    /// Decode and validate the key material into a [`CipherContext`].
    /// Fatal on wrong lengths or invalid hex.
    pub fn cipher_context(&self) -> Result<CipherContext, VaultFsError> {
        CipherContext::from_hex(&self.key_hex, &self.iv_hex)
    }

    /// Retrieval limits configured for this deployment
    pub fn retrieve_limits(&self) -> RetrieveLimits {
        RetrieveLimits {
            max_bytes: self.max_retrieve_bytes,
            timeout: Duration::from_secs(self.retrieve_timeout_secs),
        }
    }

    /// Create a new config with explicit values and default limits
    pub fn new(
        upload_dir: impl Into<String>,
        key_hex: impl Into<String>,
        iv_hex: impl Into<String>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            key_hex: key_hex.into(),
            iv_hex: iv_hex.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{IV_LEN, KEY_LEN};

    #[test]
    fn missing_key_material_is_fatal() {
        let config = Config {
            upload_dir: "./uploads".into(),
            ..Config::default()
        };
        let err = config.validate().expect_err("missing key must be rejected");
        assert!(err.is_fatal());
    }

    #[test]
    fn wrong_length_key_is_fatal() {
        let config = Config::new("./uploads", "ab".repeat(KEY_LEN - 1), "cd".repeat(IV_LEN));
        assert!(config.validate().is_ok());
        let err = config
            .cipher_context()
            .expect_err("short key must be rejected");
        assert!(err.is_fatal());
    }

    #[test]
    fn valid_config_builds_a_cipher_context() {
        let config = Config::new("./uploads", "ab".repeat(KEY_LEN), "cd".repeat(IV_LEN));
        assert!(config.validate().is_ok());
        assert!(config.cipher_context().is_ok());

        let limits = config.retrieve_limits();
        assert_eq!(limits.max_bytes, DEFAULT_MAX_RETRIEVE_BYTES);
        assert_eq!(
            limits.timeout,
            Duration::from_secs(DEFAULT_RETRIEVE_TIMEOUT_SECS)
        );
    }
}
