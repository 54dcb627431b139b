//! # Signoff Core
//!
//! Domain model for the signoff approval-workflow engine.
//!
//! This crate holds the pure data model and its invariants:
//!
//! - [`Workflow`] / [`Step`] and their status state machines
//! - [`Decision`] audit records plus quality/consistency result types
//! - [`RiskAssessment`] with the tier bands and synthesized [`ApprovalPolicy`]
//! - [`EscalationPath`] / [`TimeoutWarning`] for deadline handling
//!
//! State transitions go through guarded methods ([`Step::close`],
//! [`Workflow::transition`]) so a status can never become terminal twice.
//! Orchestration, timers, and I/O live in `signoff-engine`.

mod decision;
mod error;
mod escalation;
mod risk;
mod workflow;

pub use decision::{
    ConsistencyCheck, Decision, DecisionFilter, DecisionKind, QualityAssessment, QualityFlag,
};
pub use error::StateError;
pub use escalation::{
    EscalationAction, EscalationLevel, EscalationPath, TimeoutWarning, WarningTier,
};
pub use risk::{
    ApprovalPolicy, AssessmentContext, ControlStrategy, EscalationTrigger, PolicyCondition,
    RiskAssessment, RiskTier,
};
pub use workflow::{
    Approver, Priority, Step, StepKind, StepSpec, StepStatus, Workflow, WorkflowKind, WorkflowSpec,
    WorkflowStatus,
};

/// Serde support for `std::time::Duration` as milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
