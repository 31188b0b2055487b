//! Core error types for tickwork operations.
//!
//! Steady-state registry operations never fail; these errors only surface
//! while loading configuration or bringing the engine up.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for tickwork operations.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("failed to read config '{path}': {reason}")]
    ConfigReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    ConfigParseFailed { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Lifecycle errors
    #[error("failed to spawn poller '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("failed to allocate {category} store from {pool} pool: {reason}")]
    AllocationFailed {
        category: String,
        pool: String,
        reason: String,
    },
}

impl Error {
    /// Create a config read error.
    pub fn config_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn config_parse_failed(reason: impl Into<String>) -> Self {
        Self::ConfigParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a poller spawn error.
    pub fn spawn_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a store allocation error.
    pub fn allocation_failed(
        category: impl Into<String>,
        pool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::AllocationFailed {
            category: category.into(),
            pool: pool.into(),
            reason: reason.into(),
        }
    }

    /// Whether the engine can keep running in a degraded mode after this error.
    #[must_use]
    pub const fn is_degraded_only(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}
