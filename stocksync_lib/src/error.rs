//! Error types for the library layer.

use std::fmt;

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use crate::universe::UniverseError;

/// Errors that stop a sync pass, wrapping the per-concern errors of the
/// store, provider, configuration and universe layers.
///
/// A single ticker failing to fetch is not one of these: it is reported as a
/// failed outcome and the pass continues.
#[derive(Debug)]
pub enum SyncError {
    /// The price store rejected a read or write.
    Store(StoreError),
    /// A provider could not be constructed or used.
    Provider(ProviderError),
    /// Configuration could not be loaded or is invalid.
    Config(ConfigError),
    /// The ticker universe could not be loaded.
    Universe(UniverseError),
    /// Caller-provided input failed validation.
    InvalidInput(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Store error: {}", e),
            Self::Provider(e) => write!(f, "Provider error: {}", e),
            Self::Config(e) => write!(f, "Config error: {}", e),
            Self::Universe(e) => write!(f, "Universe error: {}", e),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Provider(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Universe(e) => Some(e),
            Self::InvalidInput(_) => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<UniverseError> for SyncError {
    fn from(e: UniverseError) -> Self {
        Self::Universe(e)
    }
}
