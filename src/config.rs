//! Configuration for VaultKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, VaultError};

/// Main configuration for a VaultKV store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing file for the store. A sibling `<path>.tmp` is used while a
    /// flush is being written.
    pub path: PathBuf,

    /// fsync the temp file before it replaces the backing file
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Encryption Configuration
    // -------------------------------------------------------------------------
    /// Whether the backing file is encrypted.
    /// Must agree with `encryption_key`.
    pub has_encryption: bool,

    /// Caller-supplied secret. Never generated internally.
    pub encryption_key: Option<String>,

    // -------------------------------------------------------------------------
    // Key Configuration
    // -------------------------------------------------------------------------
    /// Compare keys ordinally ignoring case
    pub ignore_case: bool,

    // -------------------------------------------------------------------------
    // Reload Configuration
    // -------------------------------------------------------------------------
    /// Retries for transient I/O failures while reloading
    pub reload_retries: u32,

    /// Delay between reload retries (milliseconds)
    pub reload_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./vaultkv.db"),
            sync_writes: true,
            has_encryption: false,
            encryption_key: None,
            ignore_case: false,
            reload_retries: 5,
            reload_backoff_ms: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the encryption flag against the key.
    ///
    /// Called by the store before anything touches the disk, so a bad
    /// combination never survives to the first flush.
    pub fn validate(&self) -> Result<()> {
        match (self.has_encryption, self.encryption_key.as_deref()) {
            (true, None) => Err(VaultError::Config(
                "encryption enabled but no encryption key supplied".to_string(),
            )),
            (false, Some(_)) => Err(VaultError::Config(
                "encryption key supplied but encryption is disabled".to_string(),
            )),
            (true, Some("")) => Err(VaultError::Config(
                "encryption key must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Enable encryption with the given secret
    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.config.encryption_key = Some(key.into());
        self.config.has_encryption = true;
        self
    }

    /// Set the encryption flag without touching the key
    pub fn has_encryption(mut self, enabled: bool) -> Self {
        self.config.has_encryption = enabled;
        self
    }

    /// Compare keys ignoring case
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.config.ignore_case = ignore_case;
        self
    }

    /// fsync before replacing the backing file
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the number of reload retries on transient I/O errors
    pub fn reload_retries(mut self, retries: u32) -> Self {
        self.config.reload_retries = retries;
        self
    }

    /// Set the delay between reload retries (in milliseconds)
    pub fn reload_backoff_ms(mut self, ms: u64) -> Self {
        self.config.reload_backoff_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
