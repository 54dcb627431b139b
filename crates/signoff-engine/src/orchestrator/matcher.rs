//! Approver matching and policy extension seams

use signoff_core::{Approver, RiskAssessment, Step, Workflow};

/// Pluggable approver-assignment strategy
///
/// Invoked once per step at admission. The default passes the step's
/// pre-declared approver set through unmodified; alternative strategies
/// can resolve role-based assignments or load-balance across a pool. A
/// step left without approvers stays `pending` (and keeps the workflow
/// pending) until reassignment.
pub trait ApproverMatcher: Send + Sync {
    fn assign(&self, step: &Step, assessment: &RiskAssessment) -> Vec<Approver>;
}

/// Default strategy: the declared approver set, unmodified
#[derive(Debug, Default)]
pub struct DeclaredApprovers;

impl ApproverMatcher for DeclaredApprovers {
    fn assign(&self, step: &Step, _assessment: &RiskAssessment) -> Vec<Approver> {
        step.approvers.clone()
    }
}

/// Extension point invoked after policy application at admission
///
/// Replaces reserved integration hooks with an explicit capability: the
/// orchestrator calls every registered extension with the materialized
/// workflow and its assessment. The default is a no-op.
pub trait PolicyExtension: Send + Sync {
    fn apply(&self, workflow: &mut Workflow, assessment: &RiskAssessment);
}

/// No-op extension
#[derive(Debug, Default)]
pub struct NoopExtension;

impl PolicyExtension for NoopExtension {
    fn apply(&self, _workflow: &mut Workflow, _assessment: &RiskAssessment) {}
}
