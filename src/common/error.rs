//! Error types for rigcheck
//!
//! Only configuration, connection and authorization failures end a run
//! early. Probe faults are absorbed by the orchestrator and never surface
//! here directly.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rigcheck
#[derive(Error, Debug)]
pub enum Error {
    // === Registry / Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid checklist '{path}': {error}")]
    ChecklistParse { path: String, error: String },

    #[error("Duplicate step id '{0}' in checklist")]
    DuplicateStep(String),

    #[error("Step '{step}' requires probe capability '{capability}' but no adapter is configured. Add a [probes.{capability}] section to the config file")]
    MissingCapability { step: String, capability: String },

    // === Device Connection Errors ===
    #[error("Cannot connect to device: {0}")]
    Connection(String),

    #[error("Missing credential {0}. Set it in the environment or in a .env file")]
    MissingCredential(&'static str),

    // === Session Errors ===
    #[error("Session is {state}; cannot {action}")]
    InvalidState { action: String, state: String },

    #[error("Operator channel closed: {0}")]
    Operator(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a missing capability error
    pub fn missing_capability(step: &str, capability: impl std::fmt::Display) -> Self {
        Self::MissingCapability {
            step: step.to_string(),
            capability: capability.to_string(),
        }
    }

    /// Whether this error belongs to the configuration family (registry,
    /// config file, checklist file, unreadable input files)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::ConfigParse(_)
                | Error::ChecklistParse { .. }
                | Error::FileRead { .. }
                | Error::DuplicateStep(_)
                | Error::MissingCapability { .. }
        )
    }

    /// Whether this error means the device connection could not be established
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::MissingCredential(_))
    }

    /// Process exit status for a run that ended with this error
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            super::exit::CONFIGURATION_ERROR
        } else if self.is_connection() {
            super::exit::CONNECTION_ERROR
        } else {
            super::exit::INTERNAL_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::exit;

    #[test]
    fn test_exit_codes_by_family() {
        assert_eq!(
            Error::DuplicateStep("stream-h264".into()).exit_code(),
            exit::CONFIGURATION_ERROR
        );
        assert_eq!(
            Error::missing_capability("onvif", "discovery").exit_code(),
            exit::CONFIGURATION_ERROR
        );
        assert_eq!(
            Error::MissingCredential("API_KEY").exit_code(),
            exit::CONNECTION_ERROR
        );
        assert_eq!(
            Error::Connection("refused".into()).exit_code(),
            exit::CONNECTION_ERROR
        );
        assert_eq!(
            Error::Internal("boom".into()).exit_code(),
            exit::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_missing_capability_message_names_section() {
        let msg = Error::missing_capability("upload-medium", "upload").to_string();
        assert!(msg.contains("[probes.upload]"));
        assert!(msg.contains("upload-medium"));
    }
}
