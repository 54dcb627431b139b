//! Timeout detection and escalation engine
//!
//! Tracks a deadline per active step, emits graduated warnings as the
//! deadline approaches, and constructs a leveled escalation path on
//! breach. Registration is an atomic upsert keyed by step id, safe
//! against a concurrently running sweep; a step deregistered mid-sweep is
//! skipped, never double-processed. Breach handling is idempotent: one
//! open path per step, ever.
//!
//! All checks take an explicit `now` so timing behavior is testable with
//! simulated clocks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use signoff_core::{
    EscalationAction, EscalationLevel, EscalationPath, Priority, StepKind, TimeoutWarning,
    WarningTier,
};

/// Thresholds, warning bands, and level tables
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Base threshold per step kind
    pub approval_threshold: Duration,
    pub review_threshold: Duration,
    pub escalation_threshold: Duration,
    pub automated_threshold: Duration,

    /// Priority multipliers applied to the base threshold
    pub urgent_factor: f64,
    pub high_factor: f64,
    pub medium_factor: f64,
    pub low_factor: f64,

    /// Remaining-fraction bands for warning tiers
    pub early_band: f64,
    pub critical_band: f64,
    pub final_band: f64,

    /// Owner roles per escalation level, lowest first
    pub level_roles: Vec<String>,
    /// Sub-timeout per escalation level
    pub level_sub_timeouts: Vec<Duration>,
    /// Whether an exhausted path auto-rejects the step; when disabled the
    /// step times out instead and the workflow is left to its expiry
    /// ceiling
    pub auto_reject_on_exhaustion: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            approval_threshold: Duration::from_secs(3600),
            review_threshold: Duration::from_secs(1800),
            escalation_threshold: Duration::from_secs(900),
            automated_threshold: Duration::from_secs(300),
            urgent_factor: 0.5,
            high_factor: 0.75,
            medium_factor: 1.0,
            low_factor: 1.5,
            early_band: 0.5,
            critical_band: 0.3,
            final_band: 0.1,
            level_roles: vec![
                "team_lead".into(),
                "department_manager".into(),
                "senior_management".into(),
                "executive_committee".into(),
            ],
            level_sub_timeouts: vec![
                Duration::from_secs(900),
                Duration::from_secs(1800),
                Duration::from_secs(3600),
                Duration::from_secs(7200),
            ],
            auto_reject_on_exhaustion: true,
        }
    }
}

impl EscalationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline threshold for a step: kind base scaled by priority
    pub fn threshold(&self, kind: StepKind, priority: Priority) -> Duration {
        let base = match kind {
            StepKind::Approval => self.approval_threshold,
            StepKind::Review => self.review_threshold,
            StepKind::Escalation => self.escalation_threshold,
            StepKind::Automated => self.automated_threshold,
        };
        let factor = match priority {
            Priority::Urgent => self.urgent_factor,
            Priority::High => self.high_factor,
            Priority::Medium => self.medium_factor,
            Priority::Low => self.low_factor,
        };
        base.mul_f64(factor)
    }
}

/// One step's deadline registration
#[derive(Debug, Clone)]
pub struct StepRegistration {
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    pub kind: StepKind,
    pub priority: Priority,
    pub registered_at: DateTime<Utc>,
    pub threshold: Duration,
    pub deadline: DateTime<Utc>,
}

/// Events produced by one sweep pass
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// A warning was issued or upgraded for a step
    Warning(TimeoutWarning),
    /// A step breached its deadline and a path was opened
    PathOpened(EscalationPath),
    /// An open path advanced to its next level
    LevelAdvanced {
        workflow_id: Uuid,
        step_id: Uuid,
        level: u8,
        owner_role: String,
    },
    /// Every level lapsed without recovery
    PathExhausted {
        workflow_id: Uuid,
        step_id: Uuid,
        auto_reject: bool,
    },
}

/// How a path ended; retained for retrospective evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathOutcome {
    Recovered,
    Exhausted,
}

/// Tracks per-step deadlines, warnings, and escalation paths
#[derive(Debug, Default)]
pub struct TimeoutEscalationEngine {
    config: EscalationConfig,
    registrations: DashMap<Uuid, StepRegistration>,
    warnings: DashMap<Uuid, TimeoutWarning>,
    paths: DashMap<Uuid, EscalationPath>,
    outcomes: DashMap<Uuid, PathOutcome>,
}

impl TimeoutEscalationEngine {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            registrations: DashMap::new(),
            warnings: DashMap::new(),
            paths: DashMap::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Register a step with the threshold derived from its kind and
    /// priority. Upsert: re-registering clears any active warning, which
    /// is how a step re-entering `in_progress` resets its countdown.
    pub fn register(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        kind: StepKind,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> StepRegistration {
        let threshold = self.config.threshold(kind, priority);
        self.register_with_threshold(workflow_id, step_id, kind, priority, threshold, now)
    }

    /// Register with an explicit threshold
    pub fn register_with_threshold(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        kind: StepKind,
        priority: Priority,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> StepRegistration {
        let deadline = now
            + chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::hours(1));
        let registration = StepRegistration {
            workflow_id,
            step_id,
            kind,
            priority,
            registered_at: now,
            threshold,
            deadline,
        };
        self.registrations.insert(step_id, registration.clone());
        self.warnings.remove(&step_id);
        registration
    }

    /// Drop a step's registration and warning
    pub fn deregister(&self, step_id: Uuid) {
        self.registrations.remove(&step_id);
        self.warnings.remove(&step_id);
    }

    /// Close an open path as recovered and drop the step's registration
    pub fn resolve(&self, step_id: Uuid, now: DateTime<Utc>) {
        if let Some(mut path) = self.paths.get_mut(&step_id) {
            if path.is_open() {
                path.resolved_at = Some(now);
                self.outcomes.insert(step_id, PathOutcome::Recovered);
            }
        }
        self.deregister(step_id);
    }

    pub fn active_warning(&self, step_id: Uuid) -> Option<TimeoutWarning> {
        self.warnings.get(&step_id).map(|w| w.clone())
    }

    pub fn active_warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn path(&self, step_id: Uuid) -> Option<EscalationPath> {
        self.paths.get(&step_id).map(|p| p.clone())
    }

    /// Open paths referencing the given workflow
    pub fn open_paths_for_workflow(&self, workflow_id: Uuid) -> Vec<EscalationPath> {
        self.paths
            .iter()
            .filter(|p| p.workflow_id == workflow_id && p.is_open())
            .map(|p| p.clone())
            .collect()
    }

    /// Urgency score feeding level selection: base 85, adjusted by step
    /// kind and priority, capped at 100
    pub fn urgency_score(kind: StepKind, priority: Priority) -> u8 {
        let mut score = 85u32;
        score += match kind {
            StepKind::Automated => 10,
            StepKind::Escalation => 8,
            StepKind::Approval | StepKind::Review => 0,
        };
        score += match priority {
            Priority::Urgent => 10,
            Priority::High => 5,
            Priority::Medium | Priority::Low => 0,
        };
        score.min(100) as u8
    }

    /// Open an escalation path for a step if none is open. Returns the
    /// path and whether this call created it; repeated breach detection
    /// for an already-escalated step is a no-op.
    pub fn open_path(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        kind: StepKind,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> (EscalationPath, bool) {
        match self.paths.entry(step_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_open() {
                    (occupied.get().clone(), false)
                } else {
                    // Previous path concluded; a fresh breach opens a new one
                    let path = self.build_path(workflow_id, step_id, kind, priority, now);
                    occupied.insert(path.clone());
                    self.outcomes.remove(&step_id);
                    (path, true)
                }
            }
            Entry::Vacant(vacant) => {
                let path = self.build_path(workflow_id, step_id, kind, priority, now);
                vacant.insert(path.clone());
                (path, true)
            }
        }
    }

    fn build_path(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        kind: StepKind,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> EscalationPath {
        let score = Self::urgency_score(kind, priority);
        let level_count = if score >= 95 || kind == StepKind::Automated {
            4
        } else if score >= 85 {
            3
        } else if score >= 75 {
            2
        } else {
            1
        };
        let level_count = level_count
            .min(self.config.level_roles.len())
            .min(self.config.level_sub_timeouts.len());

        let levels: Vec<EscalationLevel> = (0..level_count)
            .map(|i| {
                let mut actions = vec![EscalationAction::Notify, EscalationAction::Reassign];
                if i + 1 == level_count && self.config.auto_reject_on_exhaustion {
                    actions.push(EscalationAction::AutoReject);
                }
                EscalationLevel {
                    level: (i + 1) as u8,
                    owner_role: self.config.level_roles[i].clone(),
                    sub_timeout: self.config.level_sub_timeouts[i],
                    actions,
                }
            })
            .collect();

        EscalationPath {
            id: Uuid::now_v7(),
            workflow_id,
            step_id,
            levels,
            current_level: 0,
            level_entered_at: now,
            success_criteria: vec![
                "step reaches a decision before the fallback levels lapse".into(),
                "workflow returns from escalated to in_progress".into(),
            ],
            opened_at: now,
            resolved_at: None,
        }
    }

    /// One sweep pass over every registration
    ///
    /// Computes each step's remaining fraction, upgrades warnings, opens
    /// paths on breach, and advances open paths whose current level
    /// lapsed. At most one active warning exists per step, and breach
    /// handling never opens a second path.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<SweepEvent> {
        let mut events = Vec::new();

        let registrations: Vec<StepRegistration> =
            self.registrations.iter().map(|r| r.clone()).collect();

        for reg in registrations {
            // Deregistered mid-sweep: skip, never double-process
            if !self.registrations.contains_key(&reg.step_id) {
                continue;
            }

            let remaining = reg
                .deadline
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let remaining_fraction = remaining.as_secs_f64() / reg.threshold.as_secs_f64();

            if reg.deadline <= now {
                self.handle_breach(&reg, now, &mut events);
                continue;
            }

            let tier = if remaining_fraction <= self.config.final_band {
                Some(WarningTier::Final)
            } else if remaining_fraction <= self.config.critical_band {
                Some(WarningTier::Critical)
            } else if remaining_fraction <= self.config.early_band {
                Some(WarningTier::Early)
            } else {
                None
            };

            if let Some(tier) = tier {
                let warning = TimeoutWarning {
                    workflow_id: reg.workflow_id,
                    step_id: reg.step_id,
                    tier,
                    time_remaining: remaining,
                    issued_at: now,
                };
                // Upgrade-only upsert under the entry lock, so concurrent
                // sweeps cannot double-emit the same tier
                let emitted = match self.warnings.entry(reg.step_id) {
                    Entry::Occupied(mut occupied) => {
                        if occupied.get().tier < tier {
                            occupied.insert(warning.clone());
                            true
                        } else {
                            false
                        }
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(warning.clone());
                        true
                    }
                };
                if emitted {
                    debug!(step_id = %reg.step_id, ?tier, "timeout warning");
                    events.push(SweepEvent::Warning(warning));
                }
            }
        }

        events
    }

    fn handle_breach(
        &self,
        reg: &StepRegistration,
        now: DateTime<Utc>,
        events: &mut Vec<SweepEvent>,
    ) {
        self.warnings.remove(&reg.step_id);

        let open = self
            .paths
            .get(&reg.step_id)
            .map(|p| p.is_open())
            .unwrap_or(false);

        if !open {
            let (path, created) =
                self.open_path(reg.workflow_id, reg.step_id, reg.kind, reg.priority, now);
            if created {
                debug!(step_id = %reg.step_id, levels = path.levels.len(), "escalation path opened");
                events.push(SweepEvent::PathOpened(path));
            }
            return;
        }

        // Path already open: advance when the current level's sub-timeout
        // lapses; past the last level the path is exhausted.
        let mut exhausted = None;
        if let Some(mut path) = self.paths.get_mut(&reg.step_id) {
            if path.level_lapsed(now) {
                if path.on_last_level() {
                    path.resolved_at = Some(now);
                    exhausted = Some(path.ends_in_auto_reject());
                } else {
                    path.current_level += 1;
                    path.level_entered_at = now;
                    let level = &path.levels[path.current_level];
                    events.push(SweepEvent::LevelAdvanced {
                        workflow_id: reg.workflow_id,
                        step_id: reg.step_id,
                        level: level.level,
                        owner_role: level.owner_role.clone(),
                    });
                }
            }
        }

        if let Some(auto_reject) = exhausted {
            self.outcomes.insert(reg.step_id, PathOutcome::Exhausted);
            self.registrations.remove(&reg.step_id);
            events.push(SweepEvent::PathExhausted {
                workflow_id: reg.workflow_id,
                step_id: reg.step_id,
                auto_reject,
            });
        }
    }

    /// Retrospective effectiveness report for a step's escalation, computed
    /// lazily from the recorded path data. Not part of the hot path.
    pub fn evaluate_effectiveness(&self, step_id: Uuid) -> Option<EffectivenessReport> {
        let path = self.paths.get(&step_id)?;
        let outcome = self.outcomes.get(&step_id).map(|o| *o);

        let levels_entered = path.current_level + 1;
        let mut score: i32 = 100;
        let mut improvements = Vec::new();

        score -= 15 * (levels_entered.saturating_sub(1)) as i32;
        if levels_entered > 1 {
            improvements
                .push("resolve at the first fallback level by widening its owner group".into());
        }

        match outcome {
            Some(PathOutcome::Exhausted) => {
                score -= 25;
                improvements.push("shorten the step threshold or add an earlier reviewer".into());
                improvements.push("reassign ownership before the final level is reached".into());
            }
            Some(PathOutcome::Recovered) => {}
            None => {
                improvements.push("escalation still in progress; re-evaluate after close".into());
            }
        }

        Some(EffectivenessReport {
            step_id,
            score: score.clamp(0, 100) as u8,
            levels_entered,
            improvements,
        })
    }
}

/// Retrospective view of one step's escalation handling
#[derive(Debug, Clone)]
pub struct EffectivenessReport {
    pub step_id: Uuid,
    /// 0-100, computed from observed path data
    pub score: u8,
    pub levels_entered: usize,
    pub improvements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TimeoutEscalationEngine {
        TimeoutEscalationEngine::default()
    }

    #[test]
    fn test_threshold_scales_with_kind_and_priority() {
        let config = EscalationConfig::default();
        assert_eq!(
            config.threshold(StepKind::Approval, Priority::Medium),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.threshold(StepKind::Approval, Priority::Urgent),
            Duration::from_secs(1800)
        );
        assert_eq!(
            config.threshold(StepKind::Review, Priority::High),
            Duration::from_secs(1350)
        );
        assert_eq!(
            config.threshold(StepKind::Automated, Priority::Low),
            Duration::from_secs(450)
        );
    }

    #[test]
    fn test_warning_tiers_follow_remaining_fraction() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(1000),
            t0,
        );

        // 60% remaining: no warning yet
        assert!(e.sweep(t0 + chrono::Duration::seconds(400)).is_empty());

        // 50% remaining: early
        let events = e.sweep(t0 + chrono::Duration::seconds(500));
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::Warning(w)] if w.tier == WarningTier::Early
        ));

        // Same band again: no duplicate warning
        assert!(e.sweep(t0 + chrono::Duration::seconds(550)).is_empty());

        // 30% remaining: critical upgrade
        let events = e.sweep(t0 + chrono::Duration::seconds(700));
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::Warning(w)] if w.tier == WarningTier::Critical
        ));
    }

    #[test]
    fn test_final_warning_at_ninety_percent_elapsed() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(1000),
            t0,
        );

        let events = e.sweep(t0 + chrono::Duration::seconds(900));
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::Warning(w)] if w.tier == WarningTier::Final
        ));
        assert_eq!(
            e.active_warning(step_id).map(|w| w.tier),
            Some(WarningTier::Final)
        );
    }

    #[test]
    fn test_breach_opens_exactly_one_path() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(1000),
            t0,
        );

        let breach = t0 + chrono::Duration::seconds(1001);
        let events = e.sweep(breach);
        assert!(matches!(events.as_slice(), [SweepEvent::PathOpened(_)]));

        // Two more sweeps: path stays singular, no duplicate open
        for offset in [1010, 1020] {
            let events = e.sweep(t0 + chrono::Duration::seconds(offset));
            assert!(!events
                .iter()
                .any(|ev| matches!(ev, SweepEvent::PathOpened(_))));
        }
        assert!(e.path(step_id).unwrap().is_open());
    }

    #[test]
    fn test_breach_clears_active_warning() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(100),
            t0,
        );

        e.sweep(t0 + chrono::Duration::seconds(95));
        assert!(e.active_warning(step_id).is_some());

        e.sweep(t0 + chrono::Duration::seconds(101));
        assert!(e.active_warning(step_id).is_none());
    }

    #[test]
    fn test_reregistration_clears_warning() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        let workflow_id = Uuid::now_v7();
        e.register_with_threshold(
            workflow_id,
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(100),
            t0,
        );
        e.sweep(t0 + chrono::Duration::seconds(60));
        assert!(e.active_warning(step_id).is_some());

        e.register_with_threshold(
            workflow_id,
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(100),
            t0 + chrono::Duration::seconds(60),
        );
        assert!(e.active_warning(step_id).is_none());
    }

    #[test]
    fn test_levels_advance_and_exhaust() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        // Review/High scores 90: three levels (15m, 30m, 60m sub-timeouts)
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Review,
            Priority::High,
            Duration::from_secs(60),
            t0,
        );

        let breach = t0 + chrono::Duration::seconds(61);
        assert!(matches!(
            e.sweep(breach).as_slice(),
            [SweepEvent::PathOpened(p)] if p.levels.len() == 3
        ));

        // First level sub-timeout is 900s
        let events = e.sweep(breach + chrono::Duration::seconds(901));
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::LevelAdvanced { level: 2, .. }]
        ));

        // Second level: 1800s
        let t2 = breach + chrono::Duration::seconds(901 + 1801);
        assert!(matches!(
            e.sweep(t2).as_slice(),
            [SweepEvent::LevelAdvanced { level: 3, .. }]
        ));

        // Third level: 3600s, then exhausted with auto-reject
        let t3 = t2 + chrono::Duration::seconds(3601);
        let events = e.sweep(t3);
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::PathExhausted {
                auto_reject: true,
                ..
            }]
        ));

        // Exhausted path emits nothing further
        assert!(e.sweep(t3 + chrono::Duration::seconds(10)).is_empty());
    }

    #[test]
    fn test_exhaustion_without_auto_reject() {
        let config = EscalationConfig {
            auto_reject_on_exhaustion: false,
            ..EscalationConfig::default()
        };
        let e = TimeoutEscalationEngine::new(config);
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        // Urgent approval scores 95: four levels
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Urgent,
            Duration::from_secs(10),
            t0,
        );

        let mut now = t0 + chrono::Duration::seconds(11);
        let events = e.sweep(now);
        assert!(matches!(
            events.as_slice(),
            [SweepEvent::PathOpened(p)] if !p.ends_in_auto_reject()
        ));
        for secs in [901, 1801, 3601, 7201] {
            now += chrono::Duration::seconds(secs);
            let events = e.sweep(now);
            if let [SweepEvent::PathExhausted { auto_reject, .. }] = events.as_slice() {
                assert!(!auto_reject);
                return;
            }
        }
        panic!("path never exhausted");
    }

    #[test]
    fn test_urgency_drives_level_count() {
        assert_eq!(
            TimeoutEscalationEngine::urgency_score(StepKind::Approval, Priority::Medium),
            85
        );
        assert_eq!(
            TimeoutEscalationEngine::urgency_score(StepKind::Approval, Priority::Urgent),
            95
        );
        assert_eq!(
            TimeoutEscalationEngine::urgency_score(StepKind::Automated, Priority::Urgent),
            100
        );

        let e = engine();
        let t0 = Utc::now();
        let (path, _) = e.open_path(
            Uuid::now_v7(),
            Uuid::now_v7(),
            StepKind::Approval,
            Priority::Urgent,
            t0,
        );
        assert_eq!(path.levels.len(), 4);

        let (path, _) = e.open_path(
            Uuid::now_v7(),
            Uuid::now_v7(),
            StepKind::Approval,
            Priority::Medium,
            t0,
        );
        assert_eq!(path.levels.len(), 3);
        assert_eq!(path.levels[0].owner_role, "team_lead");
        assert!(path.ends_in_auto_reject());
    }

    #[test]
    fn test_resolve_closes_path_and_deregisters() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(10),
            t0,
        );
        e.sweep(t0 + chrono::Duration::seconds(11));
        assert!(e.path(step_id).unwrap().is_open());

        e.resolve(step_id, t0 + chrono::Duration::seconds(20));
        assert!(!e.path(step_id).unwrap().is_open());
        assert!(e.sweep(t0 + chrono::Duration::seconds(30)).is_empty());
    }

    #[test]
    fn test_effectiveness_reflects_recovery_level() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Medium,
            Duration::from_secs(10),
            t0,
        );

        let breach = t0 + chrono::Duration::seconds(11);
        e.sweep(breach);
        e.sweep(breach + chrono::Duration::seconds(901)); // level 2
        e.resolve(step_id, breach + chrono::Duration::seconds(1000));

        let report = e.evaluate_effectiveness(step_id).unwrap();
        assert_eq!(report.levels_entered, 2);
        assert_eq!(report.score, 85);
        assert!(!report.improvements.is_empty());
    }

    #[test]
    fn test_effectiveness_penalizes_exhaustion() {
        let e = engine();
        let t0 = Utc::now();
        let step_id = Uuid::now_v7();
        // Low priority approval scores 85: three levels
        e.register_with_threshold(
            Uuid::now_v7(),
            step_id,
            StepKind::Approval,
            Priority::Low,
            Duration::from_secs(10),
            t0,
        );

        let mut now = t0 + chrono::Duration::seconds(11);
        e.sweep(now);
        for secs in [901, 1801, 3601] {
            now += chrono::Duration::seconds(secs);
            e.sweep(now);
        }

        let report = e.evaluate_effectiveness(step_id).unwrap();
        assert_eq!(report.levels_entered, 3);
        assert_eq!(report.score, 45);
    }
}
