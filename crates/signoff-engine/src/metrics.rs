//! Shared engine metrics
//!
//! An explicit shared-state object created alongside the orchestrator:
//! reset at construction, never externally mutated, exposing only atomic
//! increment/read operations. Counters are commutative and lock-free so
//! they never block the hot path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Commutative counters plus a mean validation latency
#[derive(Debug)]
pub struct EngineMetrics {
    started_at: Instant,

    workflows_submitted: AtomicU64,
    workflows_approved: AtomicU64,
    workflows_rejected: AtomicU64,
    workflows_cancelled: AtomicU64,
    workflows_expired: AtomicU64,
    capacity_rejections: AtomicU64,

    decisions_committed: AtomicU64,
    decisions_refused_quality: AtomicU64,
    decisions_refused_conflict: AtomicU64,

    steps_approved: AtomicU64,
    steps_rejected: AtomicU64,
    steps_timed_out: AtomicU64,
    steps_skipped: AtomicU64,

    warnings_emitted: AtomicU64,
    escalations_opened: AtomicU64,
    escalations_exhausted: AtomicU64,

    persistence_failures: AtomicU64,
    notification_failures: AtomicU64,

    validation_micros_sum: AtomicU64,
    validation_count: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            workflows_submitted: AtomicU64::new(0),
            workflows_approved: AtomicU64::new(0),
            workflows_rejected: AtomicU64::new(0),
            workflows_cancelled: AtomicU64::new(0),
            workflows_expired: AtomicU64::new(0),
            capacity_rejections: AtomicU64::new(0),
            decisions_committed: AtomicU64::new(0),
            decisions_refused_quality: AtomicU64::new(0),
            decisions_refused_conflict: AtomicU64::new(0),
            steps_approved: AtomicU64::new(0),
            steps_rejected: AtomicU64::new(0),
            steps_timed_out: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            warnings_emitted: AtomicU64::new(0),
            escalations_opened: AtomicU64::new(0),
            escalations_exhausted: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
            validation_micros_sum: AtomicU64::new(0),
            validation_count: AtomicU64::new(0),
        }
    }

    pub fn record_submission(&self) {
        self.workflows_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_approved(&self) {
        self.workflows_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_rejected(&self) {
        self.workflows_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_cancelled(&self) {
        self.workflows_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workflow_expired(&self) {
        self.workflows_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_committed(&self) {
        self.decisions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_refused_quality(&self) {
        self.decisions_refused_quality.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_refused_conflict(&self) {
        self.decisions_refused_conflict.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_approved(&self) {
        self.steps_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_rejected(&self) {
        self.steps_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_timed_out(&self) {
        self.steps_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_skipped(&self) {
        self.steps_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warning(&self) {
        self.warnings_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation_opened(&self) {
        self.escalations_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation_exhausted(&self) {
        self.escalations_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one decision validation took
    pub fn record_validation_latency(&self, micros: u64) {
        self.validation_micros_sum.fetch_add(micros, Ordering::Relaxed);
        self.validation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view with derived rates
    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let submitted = self.workflows_submitted.load(Ordering::Relaxed);
        let validation_count = self.validation_count.load(Ordering::Relaxed);
        let mean_validation_micros = if validation_count == 0 {
            0
        } else {
            self.validation_micros_sum.load(Ordering::Relaxed) / validation_count
        };

        MetricsSnapshot {
            workflows_submitted: submitted,
            workflows_approved: self.workflows_approved.load(Ordering::Relaxed),
            workflows_rejected: self.workflows_rejected.load(Ordering::Relaxed),
            workflows_cancelled: self.workflows_cancelled.load(Ordering::Relaxed),
            workflows_expired: self.workflows_expired.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            decisions_committed: self.decisions_committed.load(Ordering::Relaxed),
            decisions_refused_quality: self.decisions_refused_quality.load(Ordering::Relaxed),
            decisions_refused_conflict: self.decisions_refused_conflict.load(Ordering::Relaxed),
            steps_approved: self.steps_approved.load(Ordering::Relaxed),
            steps_rejected: self.steps_rejected.load(Ordering::Relaxed),
            steps_timed_out: self.steps_timed_out.load(Ordering::Relaxed),
            steps_skipped: self.steps_skipped.load(Ordering::Relaxed),
            warnings_emitted: self.warnings_emitted.load(Ordering::Relaxed),
            escalations_opened: self.escalations_opened.load(Ordering::Relaxed),
            escalations_exhausted: self.escalations_exhausted.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            mean_validation_micros,
            submissions_per_sec: if elapsed > 0.0 {
                submitted as f64 / elapsed
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time metrics view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub workflows_submitted: u64,
    pub workflows_approved: u64,
    pub workflows_rejected: u64,
    pub workflows_cancelled: u64,
    pub workflows_expired: u64,
    pub capacity_rejections: u64,
    pub decisions_committed: u64,
    pub decisions_refused_quality: u64,
    pub decisions_refused_conflict: u64,
    pub steps_approved: u64,
    pub steps_rejected: u64,
    pub steps_timed_out: u64,
    pub steps_skipped: u64,
    pub warnings_emitted: u64,
    pub escalations_opened: u64,
    pub escalations_exhausted: u64,
    pub persistence_failures: u64,
    pub notification_failures: u64,
    pub mean_validation_micros: u64,
    pub submissions_per_sec: f64,
}
