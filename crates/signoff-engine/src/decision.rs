//! Decision engine
//!
//! Validates the quality of individual decisions, keeps the per-workflow
//! decision history, and detects conflicts between decisions made on the
//! same workflow. History is indexed by workflow id so consistency checks
//! complete in time bounded by that workflow's history, never by the
//! global decision log.

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use signoff_core::{
    ConsistencyCheck, Decision, DecisionFilter, DecisionKind, Priority, QualityAssessment,
    QualityFlag,
};

/// Decision validation failures
#[derive(Debug, Clone, Error)]
pub enum DecisionError {
    /// Quality below the configured floor; no state change
    #[error("decision quality {score} below threshold {floor}")]
    QualityBelowThreshold { score: u8, floor: u8 },

    /// Unresolved consistency conflict; the decision is withheld and the
    /// workflow routed to escalation
    #[error(
        "decision conflicts with {} prior decision(s) on workflow {workflow_id}; escalation required",
        .conflicting.len()
    )]
    ConflictRequiresEscalation {
        workflow_id: Uuid,
        step_id: Uuid,
        conflicting: Vec<Uuid>,
    },
}

/// Quality/consistency thresholds
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// Quality floor on the 0-100 scale
    pub quality_floor: u8,
    /// Minimum justification length in characters
    pub min_justification_len: usize,
    /// Opposing pairs at which a decision is withheld
    pub conflict_escalation_threshold: usize,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            quality_floor: 60,
            min_justification_len: 10,
            conflict_escalation_threshold: 2,
        }
    }
}

impl DecisionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality_floor(mut self, floor: u8) -> Self {
        self.quality_floor = floor;
        self
    }

    pub fn with_min_justification_len(mut self, len: usize) -> Self {
        self.min_justification_len = len;
        self
    }

    pub fn with_conflict_escalation_threshold(mut self, pairs: usize) -> Self {
        self.conflict_escalation_threshold = pairs.max(1);
        self
    }
}

/// A committed decision together with its step's order index, kept for
/// predecessor-scoped conflict detection
#[derive(Debug, Clone)]
struct DecisionRecord {
    decision: Decision,
    step_index: usize,
}

/// Validates decisions and owns the decision history
#[derive(Debug, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
    history: DashMap<Uuid, Vec<DecisionRecord>>,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self {
            policy,
            history: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Score a decision's quality
    ///
    /// The score grows with justification substance; an empty justification
    /// scores zero. Passing requires both the score floor and the minimum
    /// length. An escalate decision on a low-priority workflow is flagged
    /// as policy-inconsistent without failing the check.
    pub fn validate_quality(
        &self,
        kind: DecisionKind,
        justification: &str,
        priority: Priority,
    ) -> QualityAssessment {
        let trimmed = justification.trim();
        let len = trimmed.chars().count();
        let mut flags = Vec::new();

        let score = if len == 0 {
            flags.push(QualityFlag::EmptyJustification);
            0
        } else {
            if len < self.policy.min_justification_len {
                flags.push(QualityFlag::JustificationTooShort {
                    len,
                    min: self.policy.min_justification_len,
                });
            }
            (40 + 3 * len).min(100) as u8
        };

        if kind == DecisionKind::Escalate && priority == Priority::Low {
            flags.push(QualityFlag::EscalateOnLowPriority);
        }

        let passed = score >= self.policy.quality_floor && len >= self.policy.min_justification_len;

        QualityAssessment {
            score,
            passed,
            flags,
        }
    }

    /// Check a proposed decision against the workflow's committed history
    ///
    /// A conflict is an opposing approve/reject pair within
    /// history ∪ {proposed}, restricted to the proposed step and its
    /// predecessors (by order index). Pure function of its inputs:
    /// re-running with no intervening decisions yields identical results.
    pub fn check_consistency(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        step_index: usize,
        proposed: DecisionKind,
        decider: &str,
    ) -> ConsistencyCheck {
        let mut conflicting = Vec::new();
        let mut pairs = 0usize;

        if let Some(records) = self.history.get(&workflow_id) {
            let scoped: Vec<&DecisionRecord> = records
                .iter()
                .filter(|r| r.step_index <= step_index)
                .collect();

            // Opposing pairs already inside the committed history
            for (i, a) in scoped.iter().enumerate() {
                for b in scoped.iter().skip(i + 1) {
                    if a.decision.kind.opposes(b.decision.kind) {
                        pairs += 1;
                        push_unique(&mut conflicting, a.decision.id);
                        push_unique(&mut conflicting, b.decision.id);
                    }
                }
            }

            // Pairs the proposed decision would introduce
            for record in &scoped {
                if record.decision.kind.opposes(proposed) {
                    pairs += 1;
                    push_unique(&mut conflicting, record.decision.id);
                }
            }
        }

        let requires_escalation = pairs >= self.policy.conflict_escalation_threshold;
        let consistency_score = (100.0 - 30.0 * pairs as f64).max(0.0);

        debug!(
            %workflow_id,
            %step_id,
            decider,
            pairs,
            requires_escalation,
            "consistency check"
        );

        ConsistencyCheck {
            workflow_id,
            step_id,
            conflicting_decisions: conflicting,
            consistency_score,
            requires_escalation,
        }
    }

    /// Append a committed decision to the workflow's history
    pub fn record(&self, decision: Decision, step_index: usize) {
        self.history
            .entry(decision.workflow_id)
            .or_default()
            .push(DecisionRecord {
                decision,
                step_index,
            });
    }

    /// Read-only history query, newest first
    pub fn history(&self, filter: &DecisionFilter) -> Vec<Decision> {
        let mut out: Vec<Decision> = match filter.workflow_id {
            Some(wid) => self
                .history
                .get(&wid)
                .map(|records| {
                    records
                        .iter()
                        .map(|r| r.decision.clone())
                        .filter(|d| filter.matches(d))
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .history
                .iter()
                .flat_map(|entry| {
                    entry
                        .value()
                        .iter()
                        .map(|r| r.decision.clone())
                        .filter(|d| filter.matches(d))
                        .collect::<Vec<_>>()
                })
                .collect(),
        };
        out.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        out
    }

    /// Drop a workflow's history index (terminal cleanup)
    pub fn forget_workflow(&self, workflow_id: Uuid) {
        self.history.remove(&workflow_id);
    }
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}
