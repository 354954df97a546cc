//! Operator interaction channel and abort signal

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::session::{Provisional, StepResult};
use crate::checklist::Step;
use crate::common::Result;

/// The operator's verdict on a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAnswer {
    Pass,
    Fail,
    Skip,
    Abort,
}

/// Reply to a confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorReply {
    Answer {
        answer: OperatorAnswer,
        note: Option<String>,
    },
    /// Redo an already recorded step before answering this one
    Rerun(String),
}

impl OperatorReply {
    pub fn answer(answer: OperatorAnswer) -> Self {
        Self::Answer { answer, note: None }
    }

    pub fn with_note(answer: OperatorAnswer, note: &str) -> Self {
        Self::Answer {
            answer,
            note: Some(note.to_string()),
        }
    }
}

/// Reply to the review prompt after the last step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewReply {
    Finish,
    Rerun(String),
    Abort,
}

/// Everything the operator needs to judge a step
#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub step: &'a Step,
    /// 1-based position in the checklist
    pub position: usize,
    pub total: usize,
    pub provisional: Option<Provisional>,
    pub attempts: u32,
    pub evidence: Option<&'a str>,
    /// Whether this prompt belongs to an operator-requested re-run
    pub rerun: bool,
}

/// Request/response surface towards the human operator
#[async_trait]
pub trait Operator: Send {
    /// Show a step's instructions before its automated check runs
    async fn announce(&mut self, step: &Step, position: usize, total: usize);

    /// Block until the operator judges the step
    async fn confirm(&mut self, prompt: &Prompt<'_>) -> Result<OperatorReply>;

    /// Offer re-runs once every step has a result
    async fn review(&mut self, results: &[StepResult]) -> Result<ReviewReply>;

    /// Progress or warning line (retries, errored steps, rejected requests)
    fn notify(&mut self, message: &str);
}

/// Session-wide abort flag that in-flight waits can select on
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request the abort; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the abort has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as self, so this only returns once triggered
        let _ = rx.wait_for(|aborted| *aborted).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_signal_wakes_waiter() {
        let signal = AbortSignal::new();
        assert!(!signal.is_triggered());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_triggered() {
        let signal = AbortSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("already triggered");
    }
}
