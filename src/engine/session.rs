//! Session state
//!
//! One pass over the registry against one live device connection. Only the
//! orchestrator mutates a session; the reporter reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checklist::Registry;
use crate::common::{Error, Result};
use crate::device::{ConnectionGuard, DeviceConnection};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no connection yet
    NotStarted,
    /// Connected, steps are being executed
    InProgress,
    /// Every step was executed
    Completed,
    /// Ended early; remaining steps were not executed
    Aborted,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Terminal status of an executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    /// Infrastructure fault the operator could not judge
    Errored,
}

impl StepStatus {
    /// Failed and Errored steps block a release
    pub fn blocks_release(&self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Errored)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Advisory verdict of the automated check, before the operator answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisional {
    Pass,
    Fail,
}

impl std::fmt::Display for Provisional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Record of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// Automated invocations consumed (0 for manual steps)
    pub attempts: u32,
    pub operator_note: Option<String>,
    pub provisional: Option<Provisional>,
    /// Detail of the last automated attempt
    pub evidence: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a session ended before the registry was exhausted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The operator chose abort (or interrupted the run)
    Operator { step_id: Option<String> },
    /// A probe was refused; credentials cannot change mid-session
    Unauthorized { step_id: String, detail: String },
    /// The operator channel failed
    Interrupted { detail: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operator { step_id: Some(id) } => write!(f, "aborted by operator at step '{}'", id),
            Self::Operator { step_id: None } => write!(f, "aborted by operator"),
            Self::Unauthorized { step_id, detail } => {
                write!(f, "unauthorized during step '{}': {}", step_id, detail)
            }
            Self::Interrupted { detail } => write!(f, "interrupted: {}", detail),
        }
    }
}

/// Identity of a registry step, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: String,
    pub title: String,
}

/// Mutable run-time state of one orchestration pass
#[derive(Debug)]
pub struct Session {
    checklist: String,
    plan: Vec<PlannedStep>,
    status: SessionStatus,
    results: Vec<StepResult>,
    connection: Option<ConnectionGuard>,
    abort_reason: Option<AbortReason>,
    connection_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh session over the given registry: no results, cursor 0
    pub fn new(registry: &Registry) -> Self {
        Self {
            checklist: registry.name().to_string(),
            plan: registry
                .steps()
                .iter()
                .map(|s| PlannedStep {
                    id: s.id.clone(),
                    title: s.title.clone(),
                })
                .collect(),
            status: SessionStatus::NotStarted,
            results: Vec::new(),
            connection: None,
            abort_reason: None,
            connection_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn checklist(&self) -> &str {
        &self.checklist
    }

    pub fn plan(&self) -> &[PlannedStep] {
        &self.plan
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Results in execution order
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Index of the next pending step
    pub fn cursor(&self) -> usize {
        self.results.len()
    }

    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_id == step_id)
    }

    /// The live connection, while the session holds one
    pub fn connection(&self) -> Option<&dyn DeviceConnection> {
        self.connection.as_ref().and_then(|g| g.get())
    }

    pub fn is_connection_released(&self) -> bool {
        self.connection.as_ref().map_or(true, |g| g.is_released())
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether the session reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self.status, SessionStatus::Completed | SessionStatus::Aborted)
    }

    /// NotStarted → InProgress, taking ownership of the connection
    pub(crate) fn begin(&mut self, connection: ConnectionGuard) -> Result<()> {
        if self.status != SessionStatus::NotStarted {
            return Err(Error::invalid_state("start", self.status));
        }
        self.connection = Some(connection);
        self.connection_error = None;
        self.status = SessionStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Remember why the session could not start; it stays NotStarted
    pub(crate) fn start_failed(&mut self, error: &Error) {
        self.connection_error = Some(error.to_string());
    }

    /// Append the result of the step at the cursor
    pub(crate) fn record(&mut self, result: StepResult) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(Error::invalid_state("record a step result", self.status));
        }
        let expected = self
            .plan
            .get(self.cursor())
            .ok_or_else(|| Error::Internal("all steps already have results".to_string()))?;
        if expected.id != result.step_id {
            return Err(Error::Internal(format!(
                "result for '{}' recorded while '{}' is pending",
                result.step_id, expected.id
            )));
        }
        self.results.push(result);
        Ok(())
    }

    /// Replace the result of an already executed step (operator re-run)
    pub(crate) fn replace(&mut self, result: StepResult) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(Error::invalid_state("re-run a step", self.status));
        }
        let slot = self
            .results
            .iter_mut()
            .find(|r| r.step_id == result.step_id)
            .ok_or_else(|| {
                Error::Internal(format!("step '{}' has no result to replace", result.step_id))
            })?;
        *slot = result;
        Ok(())
    }

    /// InProgress → Completed
    pub(crate) fn complete(&mut self) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(Error::invalid_state("complete", self.status));
        }
        if self.cursor() != self.plan.len() {
            return Err(Error::Internal(format!(
                "completing with {} of {} steps executed",
                self.cursor(),
                self.plan.len()
            )));
        }
        self.status = SessionStatus::Completed;
        self.terminate();
        Ok(())
    }

    /// InProgress → Aborted
    pub(crate) fn abort(&mut self, reason: AbortReason) {
        if self.is_finished() {
            return;
        }
        tracing::warn!("Session aborted: {}", reason);
        self.abort_reason = Some(reason);
        self.status = SessionStatus::Aborted;
        self.terminate();
    }

    fn terminate(&mut self) {
        self.finished_at = Some(Utc::now());
        if let Some(guard) = &mut self.connection {
            guard.release();
        }
    }
}
