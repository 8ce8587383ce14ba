//! Service configuration loaded from TOML
//!
//! ```toml
//! expose_private_key = true
//! demo_tolerance = 0.01
//!
//! [keygen]
//! prime_bits = 256
//! primality_rounds = 40
//!
//! [keystore]
//! ttl_secs = 3600
//! capacity = 1024
//! ```
//!
//! Every section and field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::keystore::KeyStoreConfig;
use crate::types::PaillierConfig;

/// Smallest prime size the service accepts.
///
/// A float mantissa needs up to 56 bits, so smaller moduli cannot encrypt any nonzero
/// float. Multiplying two floats needs roughly 57 bits per prime.
pub const MIN_SERVICE_PRIME_BITS: u64 = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub keygen: PaillierConfig,
    pub keystore: KeyStoreConfig,
    /// Return the private key from `encrypt`. Only acceptable for demonstrations.
    pub expose_private_key: bool,
    /// Largest accepted difference between the expected and decrypted demo sums
    pub demo_tolerance: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            keygen: PaillierConfig::default(),
            keystore: KeyStoreConfig::default(),
            expose_private_key: true,
            demo_tolerance: 0.01,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keygen.prime_bits < MIN_SERVICE_PRIME_BITS {
            return Err(ConfigError::Invalid(format!(
                "keygen.prime_bits must be at least {MIN_SERVICE_PRIME_BITS}, got {}",
                self.keygen.prime_bits
            )));
        }
        if self.keygen.primality_rounds == 0 {
            return Err(ConfigError::Invalid(
                "keygen.primality_rounds must be positive".to_string(),
            ));
        }
        if !self.demo_tolerance.is_finite() || self.demo_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "demo_tolerance must be a positive number, got {}",
                self.demo_tolerance
            )));
        }
        Ok(())
    }
}
