use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::KemVariant;

/// Default plaintext bytes per chunk (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default ceiling on a declared chunk length when decoding (64 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Top-level configuration (loaded from xkem.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XkemConfig {
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

/// Container encryption parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// KEM parameter set for newly generated keypairs (default: ml-kem-768)
    pub kem: KemVariant,
    /// Plaintext bytes per chunk when encrypting (default: 1 MiB)
    pub chunk_size: usize,
    /// Largest declared chunk accepted when decrypting (default: 64 MiB)
    pub max_chunk_size: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kem: KemVariant::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl XkemConfig {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let config: XkemConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let c = &self.crypto;
        if c.chunk_size == 0 {
            return Err(CoreError::Config("crypto.chunk_size must be non-zero".into()));
        }
        if c.chunk_size > u32::MAX as usize {
            return Err(CoreError::Config(format!(
                "crypto.chunk_size {} exceeds the 32-bit frame length field",
                c.chunk_size
            )));
        }
        if c.chunk_size > c.max_chunk_size {
            return Err(CoreError::Config(format!(
                "crypto.chunk_size {} exceeds crypto.max_chunk_size {}",
                c.chunk_size, c.max_chunk_size
            )));
        }
        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(CoreError::Config(format!(
                "log.format must be \"json\" or \"text\", got \"{other}\""
            ))),
        }
    }
}
