//! Custom error types for hold-spam.
//!
//! The engine itself never surfaces errors while running; these types cover
//! the settings store, key parsing at the edges and platform setup.

use std::io;
use thiserror::Error;

/// Main error type for hold-spam operations.
#[derive(Error, Debug)]
pub enum SpamError {
    /// The specified key token could not be mapped to a key code.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing a profile file.
    #[error("failed to load profile from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing a profile file.
    #[error("failed to save profile to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// A named profile does not exist on disk.
    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    /// Profile names end up as file names, so they are restricted.
    #[error("invalid profile name '{0}'")]
    InvalidProfileName(String),

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// Error registering or handling the activation hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for hold-spam operations.
pub type Result<T> = std::result::Result<T, SpamError>;

impl SpamError {
    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ProfileNotFound error.
    pub fn profile_not_found(name: impl Into<String>) -> Self {
        Self::ProfileNotFound(name.into())
    }

    /// Create a new UnsupportedPlatform error.
    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SpamError::invalid_key("xyz", "unknown key");
        assert_eq!(err.to_string(), "invalid key 'xyz': unknown key");

        let err = SpamError::config_validation("ProcessName cannot be empty");
        assert_eq!(
            err.to_string(),
            "configuration error: ProcessName cannot be empty"
        );

        let err = SpamError::profile_not_found("raid");
        assert_eq!(err.to_string(), "profile 'raid' not found");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: SpamError = io_err.into();
        assert!(matches!(err, SpamError::Io(_)));
    }
}
