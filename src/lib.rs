//! rigcheck - hardware-in-the-loop acceptance test orchestrator
//!
//! A [`checklist::Registry`] of steps is executed by the
//! [`engine::Orchestrator`] against one live device connection. Automated
//! probes give provisional verdicts, the operator gives the final one, and
//! [`report::render`] turns the finished session into a release verdict.

pub mod checklist;
pub mod cli;
pub mod commands;
pub mod common;
pub mod device;
pub mod engine;
pub mod probe;
pub mod report;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{Orchestrator, Session, SessionStatus, StepStatus};
