//! Step orchestration
//!
//! Drives a [`Session`] through the registry one step at a time: gather
//! automated evidence (with liveness checks, timeouts and bounded retries),
//! ask the operator, record the result. The operator's answer always decides
//! the step; automated checks only inform the question.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::operator::{AbortSignal, Operator, OperatorReply, Prompt, ReviewReply};
use super::policy::{resolve, Policy};
use super::session::{AbortReason, Provisional, Session, SessionStatus, StepResult, StepStatus};
use crate::checklist::{Registry, Step};
use crate::common::credentials::Credentials;
use crate::common::{Error, Result};
use crate::device::{ConnectionGuard, Connector, DeviceConnection};
use crate::probe::{ProbeError, ProbeRequest, ProbeSet};

/// What the automated phase of a step produced
#[derive(Debug)]
enum Evidence {
    /// No automated check on this step
    Manual,
    /// The check ran to a verdict (possibly after retries)
    Provisional {
        verdict: Provisional,
        attempts: u32,
        detail: String,
    },
    /// Infrastructure fault the operator cannot judge
    Errored { attempts: u32, detail: String },
    /// The probe was refused; ends the session
    Unauthorized { attempts: u32, detail: String },
    /// The operator aborted while the check was in flight
    Cancelled,
}

/// A step waiting for the operator's answer
#[derive(Debug)]
struct Pending {
    step: Step,
    index: usize,
    started_at: DateTime<Utc>,
    provisional: Option<Provisional>,
    attempts: u32,
    evidence: Option<String>,
}

impl Pending {
    fn finish(&self, status: StepStatus, note: Option<String>) -> StepResult {
        StepResult {
            step_id: self.step.id.clone(),
            status,
            attempts: self.attempts,
            operator_note: note,
            provisional: self.provisional,
            evidence: self.evidence.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// How a step ended
#[derive(Debug)]
enum StepOutcome {
    Recorded(StepResult),
    Aborted {
        result: Option<StepResult>,
        reason: AbortReason,
    },
}

enum Evaluated {
    Done(StepOutcome),
    Pending(Pending),
}

enum Confirmation {
    Final {
        status: StepStatus,
        note: Option<String>,
    },
    Abort,
    Rerun(String),
}

/// Drives sessions through a registry
pub struct Orchestrator {
    registry: Registry,
    probes: ProbeSet,
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    policy: Policy,
    operator: Box<dyn Operator>,
    abort: AbortSignal,
}

impl Orchestrator {
    pub fn new(
        registry: Registry,
        probes: ProbeSet,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        policy: Policy,
        operator: Box<dyn Operator>,
    ) -> Self {
        Self {
            registry,
            probes,
            connector,
            credentials,
            policy,
            operator,
            abort: AbortSignal::new(),
        }
    }

    /// Use an externally owned abort signal (e.g. wired to Ctrl+C)
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// A fresh session over this orchestrator's registry
    pub fn new_session(&self) -> Session {
        Session::new(&self.registry)
    }

    /// NotStarted → InProgress. On a connection failure the session stays
    /// NotStarted and remembers the error for the report.
    pub async fn start(&self, session: &mut Session) -> Result<()> {
        if session.status() != SessionStatus::NotStarted {
            return Err(Error::invalid_state("start", session.status()));
        }

        match self.connector.connect(&self.credentials).await {
            Ok(conn) => {
                tracing::info!("Connected to {}", conn.address());
                session.begin(ConnectionGuard::new(conn))
            }
            Err(e) => {
                tracing::error!("Could not start session: {}", e);
                session.start_failed(&e);
                Err(e)
            }
        }
    }

    /// Start the session and run it to a terminal state
    ///
    /// Returns Ok for both Completed and Aborted sessions. Any error leaves the
    /// session terminated (or NotStarted) with its connection released.
    pub async fn run(&mut self, session: &mut Session) -> Result<()> {
        self.start(session).await?;

        let result = self.drive(session).await;
        if let Err(e) = &result {
            session.abort(AbortReason::Interrupted {
                detail: e.to_string(),
            });
        }
        result
    }

    async fn drive(&mut self, session: &mut Session) -> Result<()> {
        if session.status() != SessionStatus::InProgress {
            return Err(Error::invalid_state("run steps", session.status()));
        }

        while session.cursor() < self.registry.len() {
            let index = session.cursor();
            if self.abort.is_triggered() {
                let step_id = self.registry.steps()[index].id.clone();
                session.abort(AbortReason::Operator {
                    step_id: Some(step_id),
                });
                return Ok(());
            }

            match self.run_step(session, index).await? {
                StepOutcome::Recorded(result) => {
                    tracing::info!(
                        "Step '{}' {} after {} attempt(s)",
                        result.step_id,
                        result.status,
                        result.attempts
                    );
                    session.record(result)?;
                }
                StepOutcome::Aborted { result, reason } => {
                    if let Some(result) = result {
                        session.record(result)?;
                    }
                    session.abort(reason);
                    return Ok(());
                }
            }
        }

        loop {
            let reply = tokio::select! {
                reply = self.operator.review(session.results()) => reply?,
                _ = self.abort.cancelled() => ReviewReply::Abort,
            };

            match reply {
                ReviewReply::Finish => break,
                ReviewReply::Abort => {
                    session.abort(AbortReason::Operator { step_id: None });
                    return Ok(());
                }
                ReviewReply::Rerun(id) => {
                    let Some(target) = self.rerun_target(session, &id, None) else {
                        continue;
                    };
                    if let Some(reason) = self.rerun(session, target).await? {
                        session.abort(reason);
                        return Ok(());
                    }
                }
            }
        }

        tracing::info!("All {} steps executed", self.registry.len());
        session.complete()
    }

    /// Execute the step at the cursor, serving re-run requests made at its prompt
    async fn run_step(&mut self, session: &mut Session, index: usize) -> Result<StepOutcome> {
        // Evidence is gathered again after every completed re-run.
        'step: loop {
            let pending = match self.evaluate(session, index).await {
                Evaluated::Done(outcome) => return Ok(outcome),
                Evaluated::Pending(pending) => pending,
            };

            loop {
                match self.confirm(&pending, false).await? {
                    Confirmation::Final { status, note } => {
                        return Ok(StepOutcome::Recorded(pending.finish(status, note)));
                    }
                    Confirmation::Abort => {
                        return Ok(StepOutcome::Aborted {
                            result: None,
                            reason: AbortReason::Operator {
                                step_id: Some(pending.step.id.clone()),
                            },
                        });
                    }
                    Confirmation::Rerun(id) => {
                        let current = Some(pending.step.id.as_str());
                        let Some(target) = self.rerun_target(session, &id, current) else {
                            continue;
                        };
                        if let Some(reason) = self.rerun(session, target).await? {
                            return Ok(StepOutcome::Aborted {
                                result: None,
                                reason,
                            });
                        }
                        continue 'step;
                    }
                }
            }
        }
    }

    /// Validate a re-run request: only steps that already have a result
    fn rerun_target(&mut self, session: &Session, id: &str, current: Option<&str>) -> Option<usize> {
        match self.registry.position(id) {
            Some(index) if index < session.cursor() => Some(index),
            Some(_) if current == Some(id) => {
                self.operator
                    .notify(&format!("'{}' is the current step; answer it instead", id));
                None
            }
            Some(_) => {
                self.operator
                    .notify(&format!("Step '{}' has not run yet", id));
                None
            }
            None => {
                self.operator.notify(&format!("Unknown step '{}'", id));
                None
            }
        }
    }

    /// Execute an already recorded step again and replace its result in place.
    /// Returns the abort reason if the re-run ended the session.
    async fn rerun(&mut self, session: &mut Session, index: usize) -> Result<Option<AbortReason>> {
        let step_id = self.registry.steps()[index].id.clone();
        tracing::info!("Re-running step '{}' at operator request", step_id);

        let pending = match self.evaluate(session, index).await {
            Evaluated::Done(StepOutcome::Recorded(result)) => {
                session.replace(result)?;
                return Ok(None);
            }
            Evaluated::Done(StepOutcome::Aborted { result, reason }) => {
                if let Some(result) = result {
                    session.replace(result)?;
                }
                return Ok(Some(reason));
            }
            Evaluated::Pending(pending) => pending,
        };

        match self.confirm(&pending, true).await? {
            Confirmation::Final { status, note } => {
                session.replace(pending.finish(status, note))?;
                Ok(None)
            }
            Confirmation::Abort => Ok(Some(AbortReason::Operator {
                step_id: Some(step_id),
            })),
            Confirmation::Rerun(_) => Err(Error::Internal(
                "nested re-run request escaped the re-run prompt".to_string(),
            )),
        }
    }

    /// Announce a step and gather its automated evidence
    async fn evaluate(&mut self, session: &Session, index: usize) -> Evaluated {
        let step = self.registry.steps()[index].clone();
        let started_at = Utc::now();
        tracing::info!("Step {}/{}: {}", index + 1, self.registry.len(), step.id);
        self.operator
            .announce(&step, index + 1, self.registry.len())
            .await;

        let errored = |attempts: u32, detail: String| StepResult {
            step_id: step.id.clone(),
            status: StepStatus::Errored,
            attempts,
            operator_note: None,
            provisional: None,
            evidence: Some(detail),
            started_at,
            finished_at: Utc::now(),
        };

        let gathered = self.gather(session.connection(), &step).await;
        let (provisional, attempts, evidence) = match gathered {
            Evidence::Manual => (None, 0, None),
            Evidence::Provisional {
                verdict,
                attempts,
                detail,
            } => (Some(verdict), attempts, Some(detail)),
            Evidence::Errored { attempts, detail } => {
                tracing::error!("Step '{}' errored: {}", step.id, detail);
                self.operator
                    .notify(&format!("Step '{}' errored: {}", step.id, detail));
                return Evaluated::Done(StepOutcome::Recorded(errored(attempts, detail)));
            }
            Evidence::Unauthorized { attempts, detail } => {
                tracing::error!("Step '{}' was refused: {}", step.id, detail);
                let reason = AbortReason::Unauthorized {
                    step_id: step.id.clone(),
                    detail: detail.clone(),
                };
                return Evaluated::Done(StepOutcome::Aborted {
                    result: Some(errored(attempts, format!("unauthorized: {}", detail))),
                    reason,
                });
            }
            Evidence::Cancelled => {
                return Evaluated::Done(StepOutcome::Aborted {
                    result: None,
                    reason: AbortReason::Operator {
                        step_id: Some(step.id.clone()),
                    },
                });
            }
        };

        let pending = Pending {
            step,
            index,
            started_at,
            provisional,
            attempts,
            evidence,
        };

        if provisional == Some(Provisional::Pass)
            && pending.step.fully_automated
            && self.policy.auto_pass_clean_checks
        {
            self.operator.notify(&format!(
                "Step '{}' passed automatically",
                pending.step.id
            ));
            return Evaluated::Done(StepOutcome::Recorded(
                pending.finish(StepStatus::Passed, Some("passed automatically".to_string())),
            ));
        }

        Evaluated::Pending(pending)
    }

    /// Run the step's automated check under the retry policy
    async fn gather(&mut self, conn: Option<&dyn DeviceConnection>, step: &Step) -> Evidence {
        let Some(check) = &step.automated_check else {
            return Evidence::Manual;
        };
        let Some(entry) = self.probes.get(check.capability).cloned() else {
            return Evidence::Errored {
                attempts: 1,
                detail: format!("no probe adapter for '{}'", check.capability),
            };
        };
        let Some(conn) = conn else {
            return Evidence::Errored {
                attempts: 1,
                detail: "device connection already released".to_string(),
            };
        };

        let timeout = self.policy.attempt_timeout(check.timeout_secs, entry.timeout);
        let request = ProbeRequest {
            step_id: &step.id,
            params: &check.params,
        };
        let max_attempts = self.policy.max_attempts;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let alive = tokio::select! {
                alive = conn.is_alive() => alive,
                _ = self.abort.cancelled() => return Evidence::Cancelled,
            };
            if !alive {
                return Evidence::Errored {
                    attempts,
                    detail: "device connection lost before the check".to_string(),
                };
            }

            tracing::debug!(
                "Running {} probe for '{}' (attempt {}/{}, timeout {:?})",
                entry.probe.name(),
                step.id,
                attempts,
                max_attempts,
                timeout
            );
            let result = tokio::select! {
                result = tokio::time::timeout(timeout, entry.probe.probe(conn, &request)) => result,
                _ = self.abort.cancelled() => return Evidence::Cancelled,
            };

            let failure = match result {
                Ok(Ok(outcome)) if outcome.matched => {
                    return Evidence::Provisional {
                        verdict: Provisional::Pass,
                        attempts,
                        detail: outcome.detail,
                    };
                }
                Ok(Ok(outcome)) => outcome.detail,
                Ok(Err(e)) if e.is_fatal() => {
                    return Evidence::Unauthorized {
                        attempts,
                        detail: e.detail,
                    };
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => ProbeError::timeout(timeout).to_string(),
            };
            tracing::warn!(
                "Check for '{}' failed on attempt {}: {}",
                step.id,
                attempts,
                failure
            );

            let alive = tokio::select! {
                alive = conn.is_alive() => alive,
                _ = self.abort.cancelled() => return Evidence::Cancelled,
            };
            if !alive {
                return Evidence::Errored {
                    attempts,
                    detail: format!("device connection lost during the check ({})", failure),
                };
            }

            if !step.retryable || attempts >= max_attempts {
                return Evidence::Provisional {
                    verdict: Provisional::Fail,
                    attempts,
                    detail: failure,
                };
            }

            let delay = self.policy.backoff_delay(attempts);
            self.operator.notify(&format!(
                "Attempt {}/{} failed: {}. Retrying in {}s",
                attempts,
                max_attempts,
                failure,
                delay.as_secs_f64()
            ));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.abort.cancelled() => return Evidence::Cancelled,
            }
        }
    }

    /// Ask the operator until they give a usable answer.
    /// Re-run requests are only passed up from a regular (non re-run) prompt.
    async fn confirm(&mut self, pending: &Pending, rerun: bool) -> Result<Confirmation> {
        loop {
            let prompt = Prompt {
                step: &pending.step,
                position: pending.index + 1,
                total: self.registry.len(),
                provisional: pending.provisional,
                attempts: pending.attempts,
                evidence: pending.evidence.as_deref(),
                rerun,
            };

            let reply = tokio::select! {
                reply = self.operator.confirm(&prompt) => reply?,
                _ = self.abort.cancelled() => return Ok(Confirmation::Abort),
            };

            match reply {
                OperatorReply::Answer { answer, note } => {
                    return Ok(match resolve(pending.provisional, answer) {
                        Some(status) => Confirmation::Final { status, note },
                        None => Confirmation::Abort,
                    });
                }
                OperatorReply::Rerun(id) if rerun => {
                    self.operator.notify(&format!(
                        "Finish re-running '{}' before re-running '{}'",
                        pending.step.id, id
                    ));
                }
                OperatorReply::Rerun(id) => return Ok(Confirmation::Rerun(id)),
            }
        }
    }
}
