//! Workflow and step types with their status state machines
//!
//! A [`Workflow`] is one end-to-end approval request composed of ordered
//! [`Step`]s. Steps advance `pending -> in_progress -> terminal` exactly
//! once; the workflow status derives from its topology's completion
//! predicate (see [`Workflow::completion_satisfied`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;
use crate::risk::RiskTier;

/// Request priority, ordered `Low < Medium < High < Urgent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Step sequencing topology of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Steps activate one at a time in index order
    Sequential,
    /// All steps activate at once; every mandatory step must approve
    Parallel,
    /// All steps activate at once; a quorum fraction of approvers decides
    Consensus,
}

/// Workflow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Escalated,
    Cancelled,
    Expired,
}

impl WorkflowStatus {
    /// Terminal statuses release the workflow's admission slot.
    /// `Escalated` is not terminal: recovery is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Approved
                | WorkflowStatus::Rejected
                | WorkflowStatus::Cancelled
                | WorkflowStatus::Expired
        )
    }
}

/// Step lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Skipped,
    TimedOut,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Approved | StepStatus::Rejected | StepStatus::Skipped | StepStatus::TimedOut
        )
    }
}

/// Kind of approval unit a step represents; drives its base timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Human approval gate
    Approval,
    /// Expert review pass
    Review,
    /// Step created by an escalation procedure
    Escalation,
    /// Machine-checkable gate
    Automated,
}

/// A person (or role) eligible to decide on a step
///
/// Identities are opaque to the core; the contact reference is resolved by
/// the identity collaborator when notifications go out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl Approver {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            contact: None,
        }
    }
}

/// Declarative step input for [`WorkflowSpec`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub kind: StepKind,
    /// Pre-declared approver set; may be empty when assignment is deferred
    /// to the approver-matching strategy
    #[serde(default)]
    pub approvers: Vec<Approver>,
    pub required_approvals: u32,
    #[serde(default)]
    pub optional: bool,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            approvers: vec![],
            required_approvals: 1,
            optional: false,
        }
    }

    pub fn with_approver(mut self, approver: Approver) -> Self {
        self.approvers.push(approver);
        self
    }

    pub fn with_required_approvals(mut self, count: u32) -> Self {
        self.required_approvals = count;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Submission input for a new workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub kind: WorkflowKind,
    pub steps: Vec<StepSpec>,
    pub requester: String,
    /// Consensus quorum fraction override (0, 1]; ignored for other kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<f64>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>, kind: WorkflowKind, requester: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            steps: vec![],
            requester: requester.into(),
            quorum: None,
        }
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_quorum(mut self, quorum: f64) -> Self {
        self.quorum = Some(quorum);
        self
    }
}

/// One unit of required approval within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    /// Order index within the workflow; predecessor relation for
    /// sequential activation and consistency scoping
    pub index: usize,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub approvers: Vec<Approver>,
    pub required_approvals: u32,
    pub approvals: u32,
    pub optional: bool,
    /// True for steps injected by risk policy rather than declared by the
    /// requester
    pub policy_mandated: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn from_spec(spec: StepSpec, index: usize) -> Self {
        Self {
            id: Uuid::now_v7(),
            index,
            name: spec.name,
            kind: spec.kind,
            status: StepStatus::Pending,
            approvers: spec.approvers,
            required_approvals: spec.required_approvals,
            approvals: 0,
            optional: spec.optional,
            policy_mandated: false,
            deadline: None,
            activated_at: None,
            closed_at: None,
        }
    }

    pub fn is_approver(&self, id: &str) -> bool {
        self.approvers.iter().any(|a| a.id == id)
    }

    /// Activate the step: `pending -> in_progress`
    pub fn begin(&mut self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> Result<(), StateError> {
        if self.status != StepStatus::Pending {
            return Err(StateError::IllegalStepTransition {
                step: self.id,
                from: self.status,
                to: StepStatus::InProgress,
            });
        }
        if self.approvers.is_empty() {
            return Err(StateError::NoApprovers { step: self.id });
        }
        self.status = StepStatus::InProgress;
        self.activated_at = Some(now);
        self.deadline = Some(deadline);
        Ok(())
    }

    /// Accumulate one approval; returns the new count
    pub fn record_approval(&mut self) -> u32 {
        self.approvals += 1;
        self.approvals
    }

    pub fn approvals_satisfied(&self) -> bool {
        self.approvals >= self.required_approvals
    }

    /// Close the step with a terminal status. A step becomes terminal at
    /// most once; a pending step may only be skipped.
    pub fn close(&mut self, status: StepStatus, now: DateTime<Utc>) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::StepAlreadyTerminal {
                step: self.id,
                status: self.status,
            });
        }
        if !status.is_terminal()
            || (self.status == StepStatus::Pending && status != StepStatus::Skipped)
        {
            return Err(StateError::IllegalStepTransition {
                step: self.id,
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Whether the step counts as satisfied for completion purposes.
    /// A closed optional step never blocks its successors.
    pub fn satisfied(&self) -> bool {
        matches!(self.status, StepStatus::Approved)
            || (self.optional && self.status.is_terminal())
    }
}

/// One end-to-end approval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub priority: Priority,
    /// Set once by the risk engine at admission; replaced only through an
    /// explicit re-assessment request
    pub risk_tier: Option<RiskTier>,
    pub steps: Vec<Step>,
    pub requester: String,
    /// Consensus quorum fraction; unused for other kinds
    pub quorum: f64,
    /// Whether the synthesized policy's auto-approval conditions held at
    /// admission
    pub auto_approval_eligible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Overall ceiling independent of per-step deadlines
    pub expires_at: DateTime<Utc>,
}

impl Workflow {
    pub fn from_spec(
        spec: WorkflowSpec,
        priority: Priority,
        default_quorum: f64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let quorum = spec.quorum.unwrap_or(default_quorum);
        let steps = spec
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| Step::from_spec(s, i))
            .collect();
        Self {
            id: Uuid::now_v7(),
            name: spec.name,
            kind: spec.kind,
            status: WorkflowStatus::Pending,
            priority,
            risk_tier: None,
            steps,
            requester: spec.requester,
            quorum,
            auto_approval_eligible: false,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    pub fn step(&self, step_id: Uuid) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: Uuid) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// Steps currently awaiting decisions
    pub fn active_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
    }

    /// True while no step has left `pending` (the only cancellable state)
    pub fn all_steps_pending(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Pending)
    }

    pub fn total_approvals(&self) -> u32 {
        self.steps.iter().map(|s| s.approvals).sum()
    }

    pub fn total_approver_slots(&self) -> usize {
        self.steps.iter().map(|s| s.approvers.len()).sum()
    }

    /// Completion predicate for the workflow's topology
    pub fn completion_satisfied(&self) -> bool {
        match self.kind {
            WorkflowKind::Sequential => self.steps.iter().all(|s| s.satisfied()),
            WorkflowKind::Parallel => self
                .steps
                .iter()
                .filter(|s| !s.optional)
                .all(|s| s.status == StepStatus::Approved),
            WorkflowKind::Consensus => {
                let slots = self.total_approver_slots();
                slots > 0 && f64::from(self.total_approvals()) / slots as f64 >= self.quorum
            }
        }
    }

    /// Guarded workflow status transition; a terminal status is final.
    pub fn transition(&mut self, to: WorkflowStatus, now: DateTime<Utc>) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::WorkflowAlreadyTerminal {
                workflow: self.id,
                status: self.status,
            });
        }
        let allowed = match (self.status, to) {
            (WorkflowStatus::Pending, WorkflowStatus::InProgress)
            | (WorkflowStatus::Pending, WorkflowStatus::Cancelled)
            | (WorkflowStatus::Pending, WorkflowStatus::Expired)
            | (WorkflowStatus::Pending, WorkflowStatus::Approved)
            | (WorkflowStatus::InProgress, WorkflowStatus::Approved)
            | (WorkflowStatus::InProgress, WorkflowStatus::Rejected)
            | (WorkflowStatus::InProgress, WorkflowStatus::Escalated)
            | (WorkflowStatus::InProgress, WorkflowStatus::Expired)
            | (WorkflowStatus::Escalated, WorkflowStatus::InProgress)
            | (WorkflowStatus::Escalated, WorkflowStatus::Approved)
            | (WorkflowStatus::Escalated, WorkflowStatus::Rejected)
            | (WorkflowStatus::Escalated, WorkflowStatus::Expired) => true,
            _ => false,
        };
        if !allowed {
            return Err(StateError::IllegalWorkflowTransition {
                workflow: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
