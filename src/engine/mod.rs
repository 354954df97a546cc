//! Session engine
//!
//! The orchestrator state machine, its retry policy and the operator channel.

mod operator;
mod orchestrator;
mod policy;
mod session;

pub use operator::{AbortSignal, Operator, OperatorAnswer, OperatorReply, Prompt, ReviewReply};
pub use orchestrator::Orchestrator;
pub use policy::{resolve, Policy};
pub use session::{
    AbortReason, PlannedStep, Provisional, Session, SessionStatus, StepResult, StepStatus,
};
