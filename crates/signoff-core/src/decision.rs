//! Decision audit records and validation result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a decider did on a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    Delegate,
    Escalate,
}

impl DecisionKind {
    /// Approve and Reject oppose each other; other kinds never conflict
    pub fn opposes(&self, other: DecisionKind) -> bool {
        matches!(
            (self, other),
            (DecisionKind::Approve, DecisionKind::Reject)
                | (DecisionKind::Reject, DecisionKind::Approve)
        )
    }
}

/// Immutable audit record, created once per decider-action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    pub decider: String,
    pub kind: DecisionKind,
    pub justification: String,
    /// 0-100, computed by the quality check at commit time
    pub quality_score: u8,
    pub decided_at: DateTime<Utc>,
}

/// Flags raised by the quality check; flags alone do not reject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    EmptyJustification,
    JustificationTooShort { len: usize, min: usize },
    /// An escalate decision on a low-priority workflow is policy-inconsistent
    EscalateOnLowPriority,
}

/// Outcome of validating one decision's quality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// 0-100
    pub score: u8,
    pub passed: bool,
    pub flags: Vec<QualityFlag>,
}

/// Outcome of checking one proposed decision against prior history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    /// Ids of committed decisions involved in opposing pairs
    pub conflicting_decisions: Vec<Uuid>,
    /// 100 with no conflicts, decreasing per opposing pair
    pub consistency_score: f64,
    /// Set at two or more opposing pairs; the orchestrator must refuse the
    /// decision and route to escalation
    pub requires_escalation: bool,
}

/// Filter for decision history queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decider: Option<String>,
}

impl DecisionFilter {
    pub fn workflow(workflow_id: Uuid) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            decider: None,
        }
    }

    pub fn with_decider(mut self, decider: impl Into<String>) -> Self {
        self.decider = Some(decider.into());
        self
    }

    pub fn matches(&self, decision: &Decision) -> bool {
        if let Some(wid) = self.workflow_id {
            if decision.workflow_id != wid {
                return false;
            }
        }
        if let Some(ref decider) = self.decider {
            if &decision.decider != decider {
                return false;
            }
        }
        true
    }
}
