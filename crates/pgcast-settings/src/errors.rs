//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file could not be turned into a runnable configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or does not fit the settings schema.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A merged value the relay cannot run with. `key` is the camelCase
    /// path as written in the settings file.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }

    /// Settings key that was rejected, for validation failures.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { key, .. } => Some(*key),
            Self::Read { .. } | Self::Json(_) => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
