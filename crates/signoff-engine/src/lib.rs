//! # Signoff Engine
//!
//! Approval-workflow orchestration core: drives multi-step, multi-approver
//! decision workflows under a concurrency cap, derives approval policy from
//! a computed risk tier, validates decision quality and consistency, and
//! detects and escalates stalled steps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ApprovalOrchestrator                      │
//! │  (admission gate, step advancement, workflow state machine) │
//! └─────────────────────────────────────────────────────────────┘
//!        │                   │                      │
//!        ▼                   ▼                      ▼
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────────────┐
//! │ RiskPolicy   │   │ Decision      │   │ TimeoutEscalation    │
//! │ Engine       │   │ Engine        │   │ Engine (+ sweeper)   │
//! └──────────────┘   └───────────────┘   └──────────────────────┘
//!        │                   │                      │
//!        └───────────────────┴──────────────────────┘
//!                            ▼
//!                     ┌──────────────┐
//!                     │ EngineMetrics │
//!                     └──────────────┘
//! ```
//!
//! All workflow/step mutation is serialized per workflow; cross-workflow
//! operations proceed independently. Persistence and notification delivery
//! are [`collaborators`] invoked at the edges; their failures are isolated,
//! logged, and never abort the orchestrating operation.
//!
//! ## Example
//!
//! ```ignore
//! use signoff_engine::prelude::*;
//!
//! let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
//!
//! let spec = WorkflowSpec::new("prod deploy", WorkflowKind::Sequential, "req-7")
//!     .with_step(
//!         StepSpec::new("lead signoff", StepKind::Approval)
//!             .with_approver(Approver::new("alice", "team_lead")),
//!     );
//!
//! let workflow = orchestrator
//!     .submit(spec, Priority::Medium, AssessmentContext::default())
//!     .await?;
//! ```

pub mod collaborators;
pub mod decision;
pub mod escalation;
pub mod metrics;
pub mod orchestrator;
pub mod risk;
pub mod sweeper;

/// Prelude for common imports
pub mod prelude {
    pub use crate::collaborators::{
        CollaboratorError, IdentityCollaborator, IdentityProfile, InMemoryPersistence,
        NotificationCollaborator, NotificationKind, PersistenceCollaborator, RecordedNotification,
        RecordingNotifier, StaticIdentity,
    };
    pub use crate::decision::{DecisionEngine, DecisionError, DecisionPolicy};
    pub use crate::escalation::{
        EffectivenessReport, EscalationConfig, StepRegistration, SweepEvent,
        TimeoutEscalationEngine,
    };
    pub use crate::metrics::{EngineMetrics, MetricsSnapshot};
    pub use crate::orchestrator::{
        ApprovalOrchestrator, ApproverMatcher, DecisionInput, DecisionOutcome, OrchestratorConfig,
        OrchestratorError, PolicyExtension, SweepReport, SENIOR_APPROVER_ROLE,
    };
    pub use crate::risk::{AssessmentError, RiskPolicyEngine, RiskWeights};
    pub use crate::sweeper::{SweepWorker, SweeperConfig};
    pub use signoff_core::{
        ApprovalPolicy, Approver, AssessmentContext, ControlStrategy, Decision, DecisionFilter,
        DecisionKind, EscalationPath, Priority, RiskAssessment, RiskTier, StepKind, StepSpec,
        StepStatus, TimeoutWarning, WarningTier, Workflow, WorkflowKind, WorkflowSpec,
        WorkflowStatus,
    };
}

// Re-export key types at crate root
pub use collaborators::{
    CollaboratorError, IdentityCollaborator, NotificationCollaborator, NotificationKind,
    PersistenceCollaborator,
};
pub use decision::{DecisionEngine, DecisionError, DecisionPolicy};
pub use escalation::{
    EffectivenessReport, EscalationConfig, StepRegistration, SweepEvent, TimeoutEscalationEngine,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use orchestrator::{
    ApprovalOrchestrator, ApproverMatcher, DecisionInput, DecisionOutcome, OrchestratorConfig,
    OrchestratorError, PolicyExtension, SweepReport,
};
pub use risk::{AssessmentError, RiskPolicyEngine, RiskWeights};
pub use sweeper::{SweepWorker, SweeperConfig};
