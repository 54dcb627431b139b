//! Approval orchestrator
//!
//! The root component: admits new workflows under a capacity cap, applies
//! the risk engine's policy to shape step structure, advances step state
//! as decisions arrive, and registers active steps with the timeout
//! engine. Owns the authoritative in-memory workflow table.
//!
//! All mutation of one workflow happens under that workflow's lock;
//! operations on different workflows proceed independently. Collaborator
//! calls (persistence, notifications) run after the lock is released and
//! their failures never abort the orchestrating operation.

mod matcher;

pub use matcher::{ApproverMatcher, DeclaredApprovers, NoopExtension, PolicyExtension};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use signoff_core::{
    Approver, AssessmentContext, ConsistencyCheck, Decision, DecisionKind, Priority,
    QualityAssessment, RiskAssessment, StateError, Step, StepKind, StepSpec, StepStatus, Workflow,
    WorkflowKind, WorkflowSpec, WorkflowStatus,
};

use crate::collaborators::{
    IdentityCollaborator, NotificationCollaborator, NotificationKind, PersistenceCollaborator,
};
use crate::decision::{DecisionEngine, DecisionError, DecisionPolicy};
use crate::escalation::{EscalationConfig, SweepEvent, TimeoutEscalationEngine};
use crate::metrics::EngineMetrics;
use crate::risk::{AssessmentError, RiskPolicyEngine, RiskWeights};

/// Role assigned to policy-mandated senior approval steps
pub const SENIOR_APPROVER_ROLE: &str = "senior_approver";

/// Orchestrator failures; every variant carries enough context to act on
/// without inspecting internal state
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Admission refused; retryable by the caller after backoff
    #[error("capacity exceeded: {active} non-terminal workflows at capacity {capacity}")]
    CapacityExceeded { active: usize, capacity: usize },

    /// Malformed or inadmissible input; nothing was applied
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Unknown workflow id
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    /// Unknown step id on a known workflow
    #[error("step {step_id} not found on workflow {workflow_id}")]
    StepNotFound { workflow_id: Uuid, step_id: Uuid },

    /// Risk engine refused the assessment input
    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    /// Decision engine withheld the decision
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// Internal state-machine guard violation
    #[error(transparent)]
    State(#[from] StateError),
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard admission gate on non-terminal workflows
    pub capacity: usize,
    /// Default consensus quorum fraction
    pub default_quorum: f64,
    /// Overall workflow ceiling independent of step timeouts
    pub workflow_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_quorum: 0.6,
            workflow_ttl: Duration::from_secs(72 * 3600),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_default_quorum(mut self, quorum: f64) -> Self {
        self.default_quorum = quorum;
        self
    }

    pub fn with_workflow_ttl(mut self, ttl: Duration) -> Self {
        self.workflow_ttl = ttl;
        self
    }
}

/// One decider-action on a step
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub decider: String,
    pub kind: DecisionKind,
    pub justification: String,
    /// Replacement approver; required for delegate decisions
    pub delegate_to: Option<Approver>,
}

impl DecisionInput {
    pub fn approve(decider: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            decider: decider.into(),
            kind: DecisionKind::Approve,
            justification: justification.into(),
            delegate_to: None,
        }
    }

    pub fn reject(decider: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            decider: decider.into(),
            kind: DecisionKind::Reject,
            justification: justification.into(),
            delegate_to: None,
        }
    }

    pub fn delegate(
        decider: impl Into<String>,
        justification: impl Into<String>,
        to: Approver,
    ) -> Self {
        Self {
            decider: decider.into(),
            kind: DecisionKind::Delegate,
            justification: justification.into(),
            delegate_to: Some(to),
        }
    }

    pub fn escalate(decider: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            decider: decider.into(),
            kind: DecisionKind::Escalate,
            justification: justification.into(),
            delegate_to: None,
        }
    }
}

/// Result of a committed decision
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub quality: QualityAssessment,
    pub consistency: ConsistencyCheck,
    pub workflow_status: WorkflowStatus,
    pub step_status: StepStatus,
}

/// Summary of one sweep pass
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub warnings: usize,
    pub paths_opened: usize,
    pub levels_advanced: usize,
    pub paths_exhausted: usize,
    pub expired: usize,
    pub reconciled: usize,
}

type Notification = (Vec<String>, NotificationKind, serde_json::Value);

/// The approval-workflow orchestration root
pub struct ApprovalOrchestrator {
    config: OrchestratorConfig,
    risk: RiskPolicyEngine,
    decisions: DecisionEngine,
    escalation: Arc<TimeoutEscalationEngine>,
    metrics: Arc<EngineMetrics>,
    workflows: DashMap<Uuid, Arc<Mutex<Workflow>>>,
    assessments: DashMap<Uuid, RiskAssessment>,
    active: AtomicUsize,
    matcher: Arc<dyn ApproverMatcher>,
    extensions: Vec<Arc<dyn PolicyExtension>>,
    persistence: Option<Arc<dyn PersistenceCollaborator>>,
    notifier: Option<Arc<dyn NotificationCollaborator>>,
    identity: Option<Arc<dyn IdentityCollaborator>>,
}

impl ApprovalOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            risk: RiskPolicyEngine::new(RiskWeights::default()),
            decisions: DecisionEngine::new(DecisionPolicy::default()),
            escalation: Arc::new(TimeoutEscalationEngine::new(EscalationConfig::default())),
            metrics: Arc::new(EngineMetrics::new()),
            workflows: DashMap::new(),
            assessments: DashMap::new(),
            active: AtomicUsize::new(0),
            matcher: Arc::new(DeclaredApprovers),
            extensions: vec![],
            persistence: None,
            notifier: None,
            identity: None,
        }
    }

    pub fn with_risk_weights(mut self, weights: RiskWeights) -> Self {
        self.risk = RiskPolicyEngine::new(weights);
        self
    }

    pub fn with_decision_policy(mut self, policy: DecisionPolicy) -> Self {
        self.decisions = DecisionEngine::new(policy);
        self
    }

    pub fn with_escalation_config(mut self, config: EscalationConfig) -> Self {
        self.escalation = Arc::new(TimeoutEscalationEngine::new(config));
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn ApproverMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn PolicyExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceCollaborator>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationCollaborator>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityCollaborator>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn escalation(&self) -> &TimeoutEscalationEngine {
        &self.escalation
    }

    /// Number of non-terminal workflows currently admitted
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of one workflow
    pub fn workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows
            .get(&workflow_id)
            .map(|entry| entry.value().lock().clone())
    }

    /// The stored risk assessment for a workflow
    pub fn assessment(&self, workflow_id: Uuid) -> Option<RiskAssessment> {
        self.assessments.get(&workflow_id).map(|a| a.clone())
    }

    /// Submit a new approval workflow
    ///
    /// Admission is a hard gate, not a queue: when the number of
    /// non-terminal workflows has reached capacity the call fails with
    /// [`OrchestratorError::CapacityExceeded`] and the table is unchanged;
    /// callers retry externally.
    #[instrument(skip_all, fields(name = %spec.name, ?priority))]
    pub async fn submit(
        &self,
        spec: WorkflowSpec,
        priority: Priority,
        ctx: AssessmentContext,
    ) -> Result<Workflow, OrchestratorError> {
        validate_spec(&spec, self.config.default_quorum)?;

        self.reserve_slot()?;
        match self.admit(spec, priority, ctx).await {
            Ok(workflow) => Ok(workflow),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    async fn admit(
        &self,
        spec: WorkflowSpec,
        priority: Priority,
        ctx: AssessmentContext,
    ) -> Result<Workflow, OrchestratorError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.workflow_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(72));
        let mut workflow =
            Workflow::from_spec(spec, priority, self.config.default_quorum, now, now + ttl);

        let assessment = self.risk.assess(workflow.id, &ctx, priority)?;
        if let Some(guard) = assessment.policy.violated_guard(&ctx, now) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "risk policy guard violated: {}",
                guard.label()
            )));
        }

        workflow.risk_tier = Some(assessment.tier);
        workflow.auto_approval_eligible = assessment.policy.auto_approval_allowed(&ctx, now);

        if assessment.policy.mandatory_senior_approval {
            let index = workflow.steps.len();
            let spec = StepSpec::new("senior approval", StepKind::Approval).with_approver(
                Approver::new("senior-approver", SENIOR_APPROVER_ROLE),
            );
            let mut step = Step::from_spec(spec, index);
            step.policy_mandated = true;
            workflow.steps.push(step);
        }

        for step in &mut workflow.steps {
            step.approvers = self.matcher.assign(step, &assessment);
        }

        for extension in &self.extensions {
            extension.apply(&mut workflow, &assessment);
        }

        let mut notifications = Vec::new();
        self.activate_ready_steps(&mut workflow, now, &mut notifications)?;

        if workflow.completion_satisfied() {
            // Every mandatory gate evaporated (all steps optional under
            // auto-approval); close immediately.
            self.close_workflow(&mut workflow, WorkflowStatus::Approved, now, &mut notifications)?;
        } else if workflow.steps.iter().any(|s| s.status == StepStatus::InProgress) {
            workflow.transition(WorkflowStatus::InProgress, now)?;
        }

        self.metrics.record_submission();
        self.assessments.insert(workflow.id, assessment);
        self.workflows
            .insert(workflow.id, Arc::new(Mutex::new(workflow.clone())));

        info!(
            workflow_id = %workflow.id,
            tier = ?workflow.risk_tier,
            status = ?workflow.status,
            steps = workflow.steps.len(),
            "workflow admitted"
        );

        self.dispatch(notifications).await;
        self.persist_snapshot(&workflow).await;
        Ok(workflow)
    }

    /// Submit one decision on a step
    ///
    /// Validation happens before commit, never rolled back after: a
    /// failing quality check or an unresolved consistency conflict
    /// returns the typed error and leaves workflow, step, and decision
    /// history untouched. A conflict additionally opens an escalation
    /// path for the step; the next sweep marks the workflow escalated.
    #[instrument(skip_all, fields(%workflow_id, %step_id, decider = %input.decider))]
    pub async fn submit_decision(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        input: DecisionInput,
    ) -> Result<DecisionOutcome, OrchestratorError> {
        let entry = self
            .workflows
            .get(&workflow_id)
            .map(|e| e.value().clone())
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;

        let started = Instant::now();
        let mut notifications = Vec::new();
        let result = {
            let mut workflow = entry.lock();
            self.apply_decision(
                &mut workflow,
                workflow_id,
                step_id,
                &input,
                started,
                &mut notifications,
            )
        };

        match result {
            Ok(outcome) => {
                let snapshot = entry.lock().clone();
                self.dispatch(notifications).await;
                self.persist_snapshot(&snapshot).await;
                Ok(outcome)
            }
            Err(err) => {
                // A refused decision leaves no workflow state behind, but
                // conflict routing may have queued an escalation notice.
                self.dispatch(notifications).await;
                Err(err)
            }
        }
    }

    fn apply_decision(
        &self,
        workflow: &mut Workflow,
        workflow_id: Uuid,
        step_id: Uuid,
        input: &DecisionInput,
        started: Instant,
        notifications: &mut Vec<Notification>,
    ) -> Result<DecisionOutcome, OrchestratorError> {
        if workflow.status.is_terminal() {
            return Err(OrchestratorError::ValidationFailed(format!(
                "workflow {workflow_id} is closed ({:?})",
                workflow.status
            )));
        }
        let pos = workflow
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or(OrchestratorError::StepNotFound {
                workflow_id,
                step_id,
            })?;
        let now = Utc::now();

        // Quality gate first: a decision too weak to stand on its own is
        // refused regardless of step state.
        let quality = self
            .decisions
            .validate_quality(input.kind, &input.justification, workflow.priority);
        self.metrics
            .record_validation_latency(started.elapsed().as_micros() as u64);
        if !quality.passed {
            self.metrics.record_decision_refused_quality();
            return Err(DecisionError::QualityBelowThreshold {
                score: quality.score,
                floor: self.decisions.policy().quality_floor,
            }
            .into());
        }

        // Structural checks before the consistency scan: only a decision
        // an assigned approver could actually commit may open an
        // escalation path.
        if workflow.steps[pos].status != StepStatus::InProgress {
            return Err(OrchestratorError::ValidationFailed(format!(
                "step '{}' is not awaiting decisions ({:?})",
                workflow.steps[pos].name, workflow.steps[pos].status
            )));
        }
        if !workflow.steps[pos].is_approver(&input.decider) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "'{}' is not an assigned approver of step '{}'",
                input.decider, workflow.steps[pos].name
            )));
        }
        let delegate_to = match (input.kind, input.delegate_to.clone()) {
            (DecisionKind::Delegate, None) => {
                return Err(OrchestratorError::ValidationFailed(
                    "delegate decision requires a delegate_to approver".into(),
                ))
            }
            (_, target) => target,
        };

        let consistency = self.decisions.check_consistency(
            workflow_id,
            step_id,
            pos,
            input.kind,
            &input.decider,
        );
        if consistency.requires_escalation {
            self.metrics.record_decision_refused_conflict();
            let (path, created) = self.escalation.open_path(
                workflow_id,
                step_id,
                workflow.steps[pos].kind,
                workflow.priority,
                now,
            );
            if created {
                self.metrics.record_escalation_opened();
                notifications.push((
                    vec![path
                        .current()
                        .map(|l| l.owner_role.clone())
                        .unwrap_or_else(|| SENIOR_APPROVER_ROLE.to_string())],
                    NotificationKind::EscalationOpened,
                    serde_json::json!({
                        "workflow_id": workflow_id,
                        "step_id": step_id,
                        "reason": "conflicting decisions",
                        "conflicting": consistency.conflicting_decisions,
                    }),
                ));
            }
            return Err(DecisionError::ConflictRequiresEscalation {
                workflow_id,
                step_id,
                conflicting: consistency.conflicting_decisions,
            }
            .into());
        }

        // Commit point: record first, then advance state.
        let decision = Decision {
            id: Uuid::now_v7(),
            workflow_id,
            step_id,
            decider: input.decider.clone(),
            kind: input.kind,
            justification: input.justification.clone(),
            quality_score: quality.score,
            decided_at: now,
        };
        self.decisions.record(decision.clone(), pos);
        self.metrics.record_decision_committed();

        match input.kind {
            DecisionKind::Approve => {
                workflow.steps[pos].record_approval();
                if workflow.steps[pos].approvals_satisfied() {
                    workflow.steps[pos].close(StepStatus::Approved, now)?;
                    self.metrics.record_step_approved();
                    self.escalation.resolve(step_id, now);
                    if workflow.status == WorkflowStatus::Escalated
                        && self.escalation.open_paths_for_workflow(workflow_id).is_empty()
                    {
                        workflow.transition(WorkflowStatus::InProgress, now)?;
                    }
                    self.activate_ready_steps(workflow, now, notifications)?;
                }
                if workflow.completion_satisfied() {
                    self.close_workflow(workflow, WorkflowStatus::Approved, now, notifications)?;
                }
            }
            DecisionKind::Reject => {
                workflow.steps[pos].close(StepStatus::Rejected, now)?;
                self.metrics.record_step_rejected();
                self.escalation.resolve(step_id, now);
                if !workflow.steps[pos].optional {
                    self.close_workflow(workflow, WorkflowStatus::Rejected, now, notifications)?;
                } else {
                    self.activate_ready_steps(workflow, now, notifications)?;
                    if workflow.completion_satisfied() {
                        self.close_workflow(
                            workflow,
                            WorkflowStatus::Approved,
                            now,
                            notifications,
                        )?;
                    }
                }
            }
            DecisionKind::Delegate => {
                if let Some(target) = delegate_to {
                    let step = &mut workflow.steps[pos];
                    if let Some(slot) = step.approvers.iter_mut().find(|a| a.id == input.decider) {
                        *slot = target.clone();
                    }
                    notifications.push((
                        vec![target.id.clone()],
                        NotificationKind::StepAssigned,
                        serde_json::json!({
                            "workflow_id": workflow_id,
                            "step_id": step_id,
                            "step": step.name,
                            "delegated_by": input.decider,
                        }),
                    ));
                }
            }
            DecisionKind::Escalate => {
                let (path, created) = self.escalation.open_path(
                    workflow_id,
                    step_id,
                    workflow.steps[pos].kind,
                    workflow.priority,
                    now,
                );
                if created {
                    self.metrics.record_escalation_opened();
                    notifications.push((
                        vec![path
                            .current()
                            .map(|l| l.owner_role.clone())
                            .unwrap_or_else(|| SENIOR_APPROVER_ROLE.to_string())],
                        NotificationKind::EscalationOpened,
                        serde_json::json!({
                            "workflow_id": workflow_id,
                            "step_id": step_id,
                            "reason": "escalated by decider",
                            "decider": input.decider,
                        }),
                    ));
                }
                if workflow.status == WorkflowStatus::InProgress {
                    workflow.transition(WorkflowStatus::Escalated, now)?;
                }
            }
        }
        workflow.updated_at = now;

        debug!(
            decision_id = %decision.id,
            kind = ?decision.kind,
            step_status = ?workflow.steps[pos].status,
            workflow_status = ?workflow.status,
            "decision committed"
        );

        Ok(DecisionOutcome {
            step_status: workflow.steps[pos].status,
            workflow_status: workflow.status,
            decision,
            quality,
            consistency,
        })
    }

    /// Cancel a workflow that has not started
    ///
    /// Permitted only while every step is still pending; an in-progress
    /// workflow closes through the rejection path to preserve the audit
    /// trail.
    pub async fn cancel(&self, workflow_id: Uuid) -> Result<Workflow, OrchestratorError> {
        let entry = self
            .workflows
            .get(&workflow_id)
            .map(|e| e.value().clone())
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;

        let mut notifications = Vec::new();
        let snapshot = {
            let mut workflow = entry.lock();
            if workflow.status.is_terminal() {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "workflow {workflow_id} is already closed ({:?})",
                    workflow.status
                )));
            }
            if !workflow.all_steps_pending() {
                return Err(OrchestratorError::ValidationFailed(
                    "workflow already started; close it through the rejection path".into(),
                ));
            }
            let now = Utc::now();
            self.close_workflow(&mut workflow, WorkflowStatus::Cancelled, now, &mut notifications)?;
            workflow.clone()
        };

        self.dispatch(notifications).await;
        self.persist_snapshot(&snapshot).await;
        Ok(snapshot)
    }

    /// Explicitly re-assess a workflow after a material context change
    pub fn reassess(
        &self,
        workflow_id: Uuid,
        ctx: &AssessmentContext,
    ) -> Result<RiskAssessment, OrchestratorError> {
        let entry = self
            .workflows
            .get(&workflow_id)
            .map(|e| e.value().clone())
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;
        let mut workflow = entry.lock();
        if workflow.status.is_terminal() {
            return Err(OrchestratorError::ValidationFailed(format!(
                "workflow {workflow_id} is closed ({:?})",
                workflow.status
            )));
        }
        let assessment = self.risk.assess(workflow_id, ctx, workflow.priority)?;
        workflow.risk_tier = Some(assessment.tier);
        self.assessments.insert(workflow_id, assessment.clone());
        Ok(assessment)
    }

    /// Drop a closed workflow from the in-memory tables
    ///
    /// Frees the workflow entry, its stored assessment, and its
    /// decision-history index. Only terminal workflows can be evicted;
    /// the persisted snapshot remains the audit record.
    pub fn evict(&self, workflow_id: Uuid) -> Result<(), OrchestratorError> {
        let entry = self
            .workflows
            .get(&workflow_id)
            .map(|e| e.value().clone())
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;
        {
            let workflow = entry.lock();
            if !workflow.status.is_terminal() {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "workflow {workflow_id} is still {:?}",
                    workflow.status
                )));
            }
        }
        self.workflows.remove(&workflow_id);
        self.assessments.remove(&workflow_id);
        self.decisions.forget_workflow(workflow_id);
        debug!(%workflow_id, "workflow evicted");
        Ok(())
    }

    /// Restore workflows from the persistence collaborator at startup
    ///
    /// Unavailable persistence degrades to an empty restore; the engine
    /// keeps running in memory.
    pub async fn restore(&self) -> usize {
        let Some(persistence) = &self.persistence else {
            return 0;
        };
        let workflows = match persistence.load_active_workflows().await {
            Ok(workflows) => workflows,
            Err(err) => {
                warn!(%err, "persistence degraded during restore; starting empty");
                self.metrics.record_persistence_failure();
                return 0;
            }
        };

        let now = Utc::now();
        let mut restored = 0;
        for workflow in workflows {
            if workflow.status.is_terminal() {
                continue;
            }
            for step in workflow
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::InProgress)
            {
                self.escalation
                    .register(workflow.id, step.id, step.kind, workflow.priority, now);
            }
            self.active.fetch_add(1, Ordering::SeqCst);
            self.workflows
                .insert(workflow.id, Arc::new(Mutex::new(workflow)));
            restored += 1;
        }
        info!(restored, "workflows restored from persistence");
        restored
    }

    /// Persist every non-terminal workflow
    ///
    /// Invoked by the sweep worker on its periodic persistence tick;
    /// degradation is counted per call and never propagated.
    pub async fn persist_active(&self) {
        if self.persistence.is_none() {
            return;
        }
        let snapshots: Vec<Workflow> = self
            .workflows
            .iter()
            .map(|e| e.value().lock().clone())
            .filter(|w| !w.status.is_terminal())
            .collect();
        for snapshot in &snapshots {
            self.persist_snapshot(snapshot).await;
        }
    }

    /// One timeout/escalation sweep pass at `now`
    ///
    /// Safe to re-run; a tick that partially failed is simply retried by
    /// the next tick.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut notifications: Vec<Notification> = Vec::new();
        let mut snapshots: Vec<Workflow> = Vec::new();

        for event in self.escalation.sweep(now) {
            match event {
                SweepEvent::Warning(warning) => {
                    report.warnings += 1;
                    self.metrics.record_warning();
                    let recipients = self.step_approver_ids(warning.workflow_id, warning.step_id);
                    notifications.push((
                        recipients,
                        NotificationKind::TimeoutWarning,
                        serde_json::json!({
                            "workflow_id": warning.workflow_id,
                            "step_id": warning.step_id,
                            "tier": warning.tier,
                            "time_remaining_ms": warning.time_remaining.as_millis() as u64,
                        }),
                    ));
                }
                SweepEvent::PathOpened(path) => {
                    report.paths_opened += 1;
                    self.metrics.record_escalation_opened();
                    let entry = self.workflows.get(&path.workflow_id).map(|e| e.value().clone());
                    if let Some(entry) = entry {
                        let mut workflow = entry.lock();
                        if workflow.status == WorkflowStatus::InProgress
                            && workflow.transition(WorkflowStatus::Escalated, now).is_ok()
                        {
                            snapshots.push(workflow.clone());
                        }
                    }
                    notifications.push((
                        path.current()
                            .map(|l| vec![l.owner_role.clone()])
                            .unwrap_or_default(),
                        NotificationKind::EscalationOpened,
                        serde_json::json!({
                            "workflow_id": path.workflow_id,
                            "step_id": path.step_id,
                            "levels": path.levels.len(),
                            "reason": "deadline breached",
                        }),
                    ));
                }
                SweepEvent::LevelAdvanced {
                    workflow_id,
                    step_id,
                    level,
                    owner_role,
                } => {
                    report.levels_advanced += 1;
                    notifications.push((
                        vec![owner_role.clone()],
                        NotificationKind::EscalationAdvanced,
                        serde_json::json!({
                            "workflow_id": workflow_id,
                            "step_id": step_id,
                            "level": level,
                        }),
                    ));
                }
                SweepEvent::PathExhausted {
                    workflow_id,
                    step_id,
                    auto_reject,
                } => {
                    report.paths_exhausted += 1;
                    self.metrics.record_escalation_exhausted();
                    self.handle_exhausted_path(
                        workflow_id,
                        step_id,
                        auto_reject,
                        now,
                        &mut notifications,
                        &mut snapshots,
                    );
                }
            }
        }

        report.reconciled = self.reconcile_escalated(now, &mut snapshots);
        report.expired = self.expire_overdue(now, &mut notifications, &mut snapshots);

        self.dispatch(notifications).await;
        for snapshot in &snapshots {
            self.persist_snapshot(snapshot).await;
        }
        report
    }

    fn handle_exhausted_path(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        auto_reject: bool,
        now: DateTime<Utc>,
        notifications: &mut Vec<Notification>,
        snapshots: &mut Vec<Workflow>,
    ) {
        let Some(entry) = self.workflows.get(&workflow_id).map(|e| e.value().clone()) else {
            return;
        };
        let mut workflow = entry.lock();
        let Some(pos) = workflow.steps.iter().position(|s| s.id == step_id) else {
            return;
        };
        if workflow.steps[pos].status != StepStatus::InProgress {
            return;
        }

        let terminal = if auto_reject {
            StepStatus::Rejected
        } else {
            StepStatus::TimedOut
        };
        if workflow.steps[pos].close(terminal, now).is_err() {
            return;
        }
        match terminal {
            StepStatus::Rejected => self.metrics.record_step_rejected(),
            _ => self.metrics.record_step_timed_out(),
        }

        if auto_reject && !workflow.steps[pos].optional {
            if self
                .close_workflow(&mut workflow, WorkflowStatus::Rejected, now, notifications)
                .is_ok()
            {
                snapshots.push(workflow.clone());
            }
        } else {
            // Timed-out steps leave the workflow to the expiry ceiling
            snapshots.push(workflow.clone());
        }
    }

    /// Conflict-routed escalations open path state only; here the stored
    /// workflow status catches up.
    fn reconcile_escalated(&self, now: DateTime<Utc>, snapshots: &mut Vec<Workflow>) -> usize {
        let mut reconciled = 0;
        let entries: Vec<Arc<Mutex<Workflow>>> =
            self.workflows.iter().map(|e| e.value().clone()).collect();
        for entry in entries {
            let mut workflow = entry.lock();
            if workflow.status != WorkflowStatus::InProgress {
                continue;
            }
            if self
                .escalation
                .open_paths_for_workflow(workflow.id)
                .is_empty()
            {
                continue;
            }
            if workflow.transition(WorkflowStatus::Escalated, now).is_ok() {
                reconciled += 1;
                snapshots.push(workflow.clone());
            }
        }
        reconciled
    }

    fn expire_overdue(
        &self,
        now: DateTime<Utc>,
        notifications: &mut Vec<Notification>,
        snapshots: &mut Vec<Workflow>,
    ) -> usize {
        let mut expired = 0;
        let entries: Vec<Arc<Mutex<Workflow>>> =
            self.workflows.iter().map(|e| e.value().clone()).collect();
        for entry in entries {
            let mut workflow = entry.lock();
            if workflow.status.is_terminal() || now <= workflow.expires_at {
                continue;
            }
            if self
                .close_workflow(&mut workflow, WorkflowStatus::Expired, now, notifications)
                .is_ok()
            {
                expired += 1;
                snapshots.push(workflow.clone());
            }
        }
        expired
    }

    /// Activate every pending step whose predecessors are satisfied.
    /// Optional steps are skipped outright when the workflow earned
    /// auto-approval at admission; steps without approvers stay pending.
    fn activate_ready_steps(
        &self,
        workflow: &mut Workflow,
        now: DateTime<Utc>,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), OrchestratorError> {
        loop {
            let mut progressed = false;
            let ready: Vec<usize> = match workflow.kind {
                WorkflowKind::Sequential => {
                    let mut ready = Vec::new();
                    for (i, step) in workflow.steps.iter().enumerate() {
                        if step.status != StepStatus::Pending {
                            continue;
                        }
                        if workflow.steps[..i]
                            .iter()
                            .all(|p| p.status.is_terminal() && p.satisfied())
                        {
                            ready.push(i);
                        }
                        break;
                    }
                    ready
                }
                WorkflowKind::Parallel | WorkflowKind::Consensus => workflow
                    .steps
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.status == StepStatus::Pending)
                    .map(|(i, _)| i)
                    .collect(),
            };

            for i in ready {
                if workflow.steps[i].optional && workflow.auto_approval_eligible {
                    workflow.steps[i].close(StepStatus::Skipped, now)?;
                    self.metrics.record_step_skipped();
                    progressed = true;
                    continue;
                }
                if workflow.steps[i].approvers.is_empty() {
                    continue;
                }
                let registration = self.escalation.register(
                    workflow.id,
                    workflow.steps[i].id,
                    workflow.steps[i].kind,
                    workflow.priority,
                    now,
                );
                workflow.steps[i].begin(now, registration.deadline)?;
                progressed = true;
                notifications.push((
                    workflow.steps[i].approvers.iter().map(|a| a.id.clone()).collect(),
                    NotificationKind::StepAssigned,
                    serde_json::json!({
                        "workflow_id": workflow.id,
                        "step_id": workflow.steps[i].id,
                        "step": workflow.steps[i].name,
                        "deadline": registration.deadline,
                    }),
                ));
            }

            if !progressed {
                break;
            }
        }
        Ok(())
    }

    /// Close a workflow with a terminal status and release its resources
    fn close_workflow(
        &self,
        workflow: &mut Workflow,
        status: WorkflowStatus,
        now: DateTime<Utc>,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), OrchestratorError> {
        workflow.transition(status, now)?;

        if status == WorkflowStatus::Approved {
            // Consensus can complete with residual in-progress steps
            for step in &mut workflow.steps {
                if step.status == StepStatus::InProgress {
                    let _ = step.close(StepStatus::Skipped, now);
                    self.metrics.record_step_skipped();
                }
            }
        }

        for path in self.escalation.open_paths_for_workflow(workflow.id) {
            self.escalation.resolve(path.step_id, now);
        }
        for step in &workflow.steps {
            self.escalation.deregister(step.id);
        }
        self.release_slot();

        match status {
            WorkflowStatus::Approved => self.metrics.record_workflow_approved(),
            WorkflowStatus::Rejected => self.metrics.record_workflow_rejected(),
            WorkflowStatus::Cancelled => self.metrics.record_workflow_cancelled(),
            WorkflowStatus::Expired => self.metrics.record_workflow_expired(),
            _ => {}
        }

        info!(workflow_id = %workflow.id, ?status, "workflow closed");
        notifications.push((
            vec![workflow.requester.clone()],
            NotificationKind::WorkflowClosed,
            serde_json::json!({
                "workflow_id": workflow.id,
                "status": status,
            }),
        ));
        Ok(())
    }

    fn step_approver_ids(&self, workflow_id: Uuid, step_id: Uuid) -> Vec<String> {
        self.workflows
            .get(&workflow_id)
            .and_then(|entry| {
                let workflow = entry.value().lock();
                workflow
                    .step(step_id)
                    .map(|s| s.approvers.iter().map(|a| a.id.clone()).collect())
            })
            .unwrap_or_default()
    }

    fn reserve_slot(&self) -> Result<(), OrchestratorError> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= self.config.capacity {
                self.metrics.record_capacity_rejection();
                return Err(OrchestratorError::CapacityExceeded {
                    active: current,
                    capacity: self.config.capacity,
                });
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release_slot(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn dispatch(&self, notifications: Vec<Notification>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for (recipients, kind, payload) in notifications {
            let recipients = self.resolve_recipients(recipients).await;
            if let Err(err) = notifier.notify(&recipients, kind, payload).await {
                warn!(%err, ?kind, "notification delivery failed");
                self.metrics.record_notification_failure();
            }
        }
    }

    /// Normalize recipient identities through the identity collaborator.
    /// Identities stay opaque to the core; a failed resolution falls back
    /// to the opaque id.
    async fn resolve_recipients(&self, recipients: Vec<String>) -> Vec<String> {
        let Some(identity) = &self.identity else {
            return recipients;
        };
        let mut resolved = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            match identity.resolve(&recipient).await {
                Ok(profile) => resolved.push(profile.id),
                Err(err) => {
                    debug!(%err, recipient = %recipient, "identity resolution failed; keeping opaque id");
                    resolved.push(recipient);
                }
            }
        }
        resolved
    }

    async fn persist_snapshot(&self, workflow: &Workflow) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = persistence.persist(workflow).await {
            warn!(%err, workflow_id = %workflow.id, "persistence degraded; continuing in memory");
            self.metrics.record_persistence_failure();
        }
    }
}

fn validate_spec(spec: &WorkflowSpec, default_quorum: f64) -> Result<(), OrchestratorError> {
    if spec.name.trim().is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "workflow name is required".into(),
        ));
    }
    if spec.requester.trim().is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "requester is required".into(),
        ));
    }
    if spec.steps.is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "workflow needs at least one step".into(),
        ));
    }
    for step in &spec.steps {
        if step.name.trim().is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "step name is required".into(),
            ));
        }
        if step.required_approvals == 0 {
            return Err(OrchestratorError::ValidationFailed(format!(
                "step '{}' requires at least one approval",
                step.name
            )));
        }
        if !step.approvers.is_empty() && (step.required_approvals as usize) > step.approvers.len() {
            return Err(OrchestratorError::ValidationFailed(format!(
                "step '{}' requires {} approvals but declares {} approvers",
                step.name,
                step.required_approvals,
                step.approvers.len()
            )));
        }
    }
    if spec.kind == WorkflowKind::Consensus {
        let quorum = spec.quorum.unwrap_or(default_quorum);
        if !(quorum > 0.0 && quorum <= 1.0) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "consensus quorum must be in (0, 1], got {quorum}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signoff_core::RiskTier;

    fn moderate_context() -> AssessmentContext {
        AssessmentContext::new()
            .with_business_impact(50.0)
            .with_technical_impact(40.0)
            .with_data_sensitivity(30.0)
    }

    fn two_step_sequential() -> WorkflowSpec {
        WorkflowSpec::new("prod deploy", WorkflowKind::Sequential, "req-1")
            .with_step(
                StepSpec::new("lead signoff", StepKind::Approval)
                    .with_approver(Approver::new("alice", "team_lead")),
            )
            .with_step(
                StepSpec::new("ops review", StepKind::Review)
                    .with_approver(Approver::new("bob", "ops")),
            )
    }

    #[tokio::test]
    async fn test_sequential_submit_shapes_steps() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        assert_eq!(workflow.risk_tier, Some(RiskTier::Medium));
        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(workflow.steps[0].status, StepStatus::InProgress);
        assert_eq!(workflow.steps[1].status, StepStatus::Pending);
        assert!(workflow.steps[0].deadline.is_some());
        assert_eq!(orchestrator.active_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_gate_refuses_and_leaves_table_unchanged() {
        let orchestrator =
            ApprovalOrchestrator::new(OrchestratorConfig::default().with_capacity(2));
        for _ in 0..2 {
            orchestrator
                .submit(two_step_sequential(), Priority::Medium, moderate_context())
                .await
                .unwrap();
        }

        let err = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::CapacityExceeded { active, capacity } => {
                assert_eq!(active, 2);
                assert_eq!(capacity, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.active_count(), 2);
        assert_eq!(orchestrator.metrics().snapshot().capacity_rejections, 1);
    }

    #[tokio::test]
    async fn test_terminal_workflow_releases_capacity() {
        let orchestrator =
            ApprovalOrchestrator::new(OrchestratorConfig::default().with_capacity(1));
        let workflow = orchestrator
            .submit(
                WorkflowSpec::new("one gate", WorkflowKind::Sequential, "req-1").with_step(
                    StepSpec::new("signoff", StepKind::Approval)
                        .with_approver(Approver::new("alice", "lead")),
                ),
                Priority::Low,
                AssessmentContext::default(),
            )
            .await
            .unwrap();

        let step_id = workflow.steps[0].id;
        orchestrator
            .submit_decision(
                workflow.id,
                step_id,
                DecisionInput::approve("alice", "verified scope and rollback plan"),
            )
            .await
            .unwrap();

        assert_eq!(orchestrator.active_count(), 0);
        // Slot is free again
        orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_low_quality_decision_changes_nothing() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let err = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("alice", "ok"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Decision(DecisionError::QualityBelowThreshold { floor: 60, .. })
        ));

        let after = orchestrator.workflow(workflow.id).unwrap();
        assert_eq!(after.steps[0].status, StepStatus::InProgress);
        assert_eq!(after.steps[0].approvals, 0);
        assert!(orchestrator
            .decisions()
            .history(&signoff_core::DecisionFilter::workflow(workflow.id))
            .is_empty());
    }

    #[tokio::test]
    async fn test_pending_step_low_quality_reports_quality_first() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        // Step 2 has not activated; a 2-char justification still fails on
        // quality, not on step state.
        let err = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[1].id,
                DecisionInput::approve("bob", "ok"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Decision(DecisionError::QualityBelowThreshold { .. })
        ));
        let after = orchestrator.workflow(workflow.id).unwrap();
        assert_eq!(after.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_sequential_advances_and_completes() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("alice", "change reviewed against checklist"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.step_status, StepStatus::Approved);
        assert_eq!(outcome.workflow_status, WorkflowStatus::InProgress);

        let mid = orchestrator.workflow(workflow.id).unwrap();
        assert_eq!(mid.steps[1].status, StepStatus::InProgress);

        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[1].id,
                DecisionInput::approve("bob", "ops capacity confirmed for rollout"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.workflow_status, WorkflowStatus::Approved);
        assert_eq!(orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_reject_on_mandatory_step_rejects_workflow() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::reject("alice", "missing rollback procedure entirely"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.step_status, StepStatus::Rejected);
        assert_eq!(outcome.workflow_status, WorkflowStatus::Rejected);
        assert_eq!(orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let missing = Uuid::now_v7();
        let err = orchestrator
            .submit_decision(
                missing,
                Uuid::now_v7(),
                DecisionInput::approve("alice", "does not matter here"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(id) if id == missing));

        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
        let err = orchestrator
            .submit_decision(
                workflow.id,
                Uuid::now_v7(),
                DecisionInput::approve("alice", "does not matter here"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StepNotFound { .. }));
    }

    #[tokio::test]
    async fn test_non_approver_cannot_decide() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let err = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("mallory", "I would very much like to approve"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_critical_tier_injects_senior_step() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let ctx = AssessmentContext::new()
            .with_business_impact(100.0)
            .with_technical_impact(100.0)
            .with_data_sensitivity(100.0);
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Urgent, ctx)
            .await
            .unwrap();

        assert_eq!(workflow.risk_tier, Some(RiskTier::Critical));
        assert_eq!(workflow.steps.len(), 3);
        let senior = workflow.steps.last().unwrap();
        assert!(senior.policy_mandated);
        assert_eq!(senior.approvers[0].role, SENIOR_APPROVER_ROLE);
        assert!(!workflow.auto_approval_eligible);
    }

    #[tokio::test]
    async fn test_critical_budget_guard_blocks_admission() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let ctx = AssessmentContext::new()
            .with_business_impact(100.0)
            .with_technical_impact(100.0)
            .with_data_sensitivity(100.0)
            .with_budget_at_stake(750_000.0);

        let err = orchestrator
            .submit(two_step_sequential(), Priority::Urgent, ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
        assert_eq!(orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_approval_skips_optional_steps() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let spec = WorkflowSpec::new("small change", WorkflowKind::Sequential, "req-1")
            .with_step(
                StepSpec::new("lead signoff", StepKind::Approval)
                    .with_approver(Approver::new("alice", "team_lead")),
            )
            .with_step(
                StepSpec::new("fyi review", StepKind::Review)
                    .with_approver(Approver::new("bob", "ops"))
                    .optional(),
            );
        let workflow = orchestrator
            .submit(spec, Priority::Low, AssessmentContext::new().with_budget_at_stake(500.0))
            .await
            .unwrap();
        assert!(workflow.auto_approval_eligible);

        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("alice", "trivial copy change, no risk surface"),
            )
            .await
            .unwrap();
        // Optional step skipped by policy, workflow complete
        assert_eq!(outcome.workflow_status, WorkflowStatus::Approved);
        let after = orchestrator.workflow(workflow.id).unwrap();
        assert_eq!(after.steps[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_delegate_swaps_approver() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
        let step_id = workflow.steps[0].id;

        orchestrator
            .submit_decision(
                workflow.id,
                step_id,
                DecisionInput::delegate(
                    "alice",
                    "on leave this week, handing to deputy",
                    Approver::new("dana", "team_lead"),
                ),
            )
            .await
            .unwrap();

        let after = orchestrator.workflow(workflow.id).unwrap();
        assert!(after.step(step_id).unwrap().is_approver("dana"));
        assert!(!after.step(step_id).unwrap().is_approver("alice"));

        orchestrator
            .submit_decision(
                workflow.id,
                step_id,
                DecisionInput::approve("dana", "reviewed on behalf of alice"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delegate_without_target_fails() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let input = DecisionInput {
            decider: "alice".into(),
            kind: DecisionKind::Delegate,
            justification: "handing this off to someone".into(),
            delegate_to: None,
        };
        let err = orchestrator
            .submit_decision(workflow.id, workflow.steps[0].id, input)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_escalate_decision_marks_workflow() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
        let step_id = workflow.steps[0].id;

        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                step_id,
                DecisionInput::escalate("alice", "out of my authority, needs platform owner"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.workflow_status, WorkflowStatus::Escalated);
        assert!(orchestrator.escalation().path(step_id).unwrap().is_open());

        // Approval recovers the workflow and resolves the path
        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                step_id,
                DecisionInput::approve("alice", "platform owner confirmed out of band"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.workflow_status, WorkflowStatus::InProgress);
        assert!(!orchestrator.escalation().path(step_id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_cancel_only_before_activation() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());

        // First step declares no approvers: assignment deferred, workflow pending
        let deferred = WorkflowSpec::new("deferred", WorkflowKind::Sequential, "req-1")
            .with_step(StepSpec::new("unassigned gate", StepKind::Approval));
        let workflow = orchestrator
            .submit(deferred, Priority::Medium, moderate_context())
            .await
            .unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Pending);

        let cancelled = orchestrator.cancel(workflow.id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert_eq!(orchestrator.active_count(), 0);

        // An activated workflow refuses cancellation
        let active = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
        let err = orchestrator.cancel(active.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_evict_requires_terminal_status() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();

        let err = orchestrator.evict(workflow.id).unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationFailed(_)));

        orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::reject("alice", "requirements are not met yet"),
            )
            .await
            .unwrap();

        orchestrator.evict(workflow.id).unwrap();
        assert!(orchestrator.workflow(workflow.id).is_none());
        assert!(orchestrator.assessment(workflow.id).is_none());
        assert!(orchestrator
            .decisions()
            .history(&signoff_core::DecisionFilter::workflow(workflow.id))
            .is_empty());
    }

    #[tokio::test]
    async fn test_reassess_updates_tier() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let workflow = orchestrator
            .submit(two_step_sequential(), Priority::Medium, moderate_context())
            .await
            .unwrap();
        assert_eq!(workflow.risk_tier, Some(RiskTier::Medium));

        let hotter = AssessmentContext::new()
            .with_business_impact(100.0)
            .with_technical_impact(100.0)
            .with_data_sensitivity(100.0);
        let assessment = orchestrator.reassess(workflow.id, &hotter).unwrap();
        assert_eq!(assessment.tier, RiskTier::High);
        assert_eq!(
            orchestrator.workflow(workflow.id).unwrap().risk_tier,
            Some(RiskTier::High)
        );
    }

    #[tokio::test]
    async fn test_invalid_specs_rejected() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());

        let no_steps = WorkflowSpec::new("empty", WorkflowKind::Sequential, "req-1");
        assert!(matches!(
            orchestrator
                .submit(no_steps, Priority::Low, AssessmentContext::default())
                .await
                .unwrap_err(),
            OrchestratorError::ValidationFailed(_)
        ));

        let impossible = WorkflowSpec::new("impossible", WorkflowKind::Sequential, "req-1")
            .with_step(
                StepSpec::new("gate", StepKind::Approval)
                    .with_approver(Approver::new("alice", "lead"))
                    .with_required_approvals(3),
            );
        assert!(matches!(
            orchestrator
                .submit(impossible, Priority::Low, AssessmentContext::default())
                .await
                .unwrap_err(),
            OrchestratorError::ValidationFailed(_)
        ));

        let bad_quorum = WorkflowSpec::new("vote", WorkflowKind::Consensus, "req-1")
            .with_step(
                StepSpec::new("gate", StepKind::Approval)
                    .with_approver(Approver::new("alice", "lead")),
            )
            .with_quorum(1.5);
        assert!(matches!(
            orchestrator
                .submit(bad_quorum, Priority::Low, AssessmentContext::default())
                .await
                .unwrap_err(),
            OrchestratorError::ValidationFailed(_)
        ));

        assert_eq!(orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_consensus_quorum_completes_workflow() {
        let orchestrator = ApprovalOrchestrator::new(OrchestratorConfig::default());
        let spec = WorkflowSpec::new("vote", WorkflowKind::Consensus, "req-1")
            .with_step(
                StepSpec::new("vote a", StepKind::Approval)
                    .with_approver(Approver::new("a", "board"))
                    .with_approver(Approver::new("b", "board"))
                    .with_required_approvals(2),
            )
            .with_step(
                StepSpec::new("vote b", StepKind::Approval)
                    .with_approver(Approver::new("c", "board"))
                    .with_approver(Approver::new("d", "board"))
                    .with_required_approvals(2),
            )
            .with_quorum(0.5);
        let workflow = orchestrator
            .submit(spec, Priority::Medium, moderate_context())
            .await
            .unwrap();
        assert_eq!(workflow.steps[0].status, StepStatus::InProgress);
        assert_eq!(workflow.steps[1].status, StepStatus::InProgress);

        orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("a", "supports the proposal as written"),
            )
            .await
            .unwrap();
        let outcome = orchestrator
            .submit_decision(
                workflow.id,
                workflow.steps[0].id,
                DecisionInput::approve("b", "seconded after reviewing the numbers"),
            )
            .await
            .unwrap();

        // 2 of 4 approver slots at quorum 0.5
        assert_eq!(outcome.workflow_status, WorkflowStatus::Approved);
        let after = orchestrator.workflow(workflow.id).unwrap();
        assert_eq!(after.steps[1].status, StepStatus::Skipped);
    }
}
