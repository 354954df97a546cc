//! Retry, timeout and verdict policy

use std::time::Duration;

use super::operator::OperatorAnswer;
use super::session::{Provisional, StepStatus};
use crate::common::config::Config;

/// Orchestration policy values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Automated invocations per step, first try included
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub backoff_base: Duration,
    /// Upper bound on any single delay
    pub backoff_cap: Duration,
    /// Default bound on one probe attempt
    pub probe_timeout: Duration,
    /// Skip confirmation for fully automated steps whose check matched
    pub auto_pass_clean_checks: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(15),
            auto_pass_clean_checks: false,
        }
    }
}

impl Policy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            backoff_base: Duration::from_secs(config.retry.backoff_base_secs),
            backoff_cap: Duration::from_secs(config.retry.backoff_cap_secs),
            probe_timeout: Duration::from_secs(config.timeouts.probe_secs),
            auto_pass_clean_checks: config.orchestrator.auto_pass_clean_checks,
        }
    }

    /// Delay before the next attempt after `failed_attempts` failures:
    /// `min(base * 2^(failed_attempts - 1), cap)`
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failed_attempts.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    /// Bound on one attempt: step override, then adapter override, then default
    pub fn attempt_timeout(&self, step_secs: Option<u64>, adapter: Option<Duration>) -> Duration {
        step_secs
            .map(Duration::from_secs)
            .or(adapter)
            .unwrap_or(self.probe_timeout)
    }
}

/// Combine the automated verdict with the operator's answer.
///
/// The operator is authoritative: the provisional verdict only informs the
/// question. `None` means the operator aborted the session.
pub fn resolve(provisional: Option<Provisional>, answer: OperatorAnswer) -> Option<StepStatus> {
    let status = match answer {
        OperatorAnswer::Pass => StepStatus::Passed,
        OperatorAnswer::Fail => StepStatus::Failed,
        OperatorAnswer::Skip => StepStatus::Skipped,
        OperatorAnswer::Abort => return None,
    };

    match (provisional, status) {
        (Some(Provisional::Fail), StepStatus::Passed) => {
            tracing::info!("Operator passed a step whose automated check failed")
        }
        (Some(Provisional::Pass), StepStatus::Failed) => {
            tracing::info!("Operator failed a step whose automated check passed")
        }
        _ => {}
    }

    Some(status)
}
