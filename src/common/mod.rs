//! Common utilities shared by the CLI and the orchestration engine

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Process exit statuses
pub mod exit {
    /// Session completed with every step passed or skipped
    pub const RELEASE_READY: i32 = 0;
    /// Unexpected failure outside the session state machine
    pub const INTERNAL_ERROR: i32 = 1;
    /// Session completed but at least one step failed or errored
    pub const COMPLETED_WITH_FAILURES: i32 = 2;
    /// Session aborted by the operator or by an authorization failure
    pub const ABORTED: i32 = 3;
    /// Checklist or configuration rejected before the session started
    pub const CONFIGURATION_ERROR: i32 = 4;
    /// Device connection could not be established
    pub const CONNECTION_ERROR: i32 = 5;
}
