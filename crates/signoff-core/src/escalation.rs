//! Escalation paths and timeout warnings

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Graduated warning severity as a step's deadline approaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningTier {
    Early,
    Critical,
    Final,
}

/// Ephemeral pre-breach warning; one active per step, superseded by the
/// next tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutWarning {
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    pub tier: WarningTier,
    #[serde(with = "crate::duration_millis")]
    pub time_remaining: Duration,
    pub issued_at: DateTime<Utc>,
}

/// Concrete action a fallback level carries out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    Notify,
    Reassign,
    /// Applied when every level is exhausted
    AutoReject,
}

/// One level of a leveled fallback procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationLevel {
    /// 1-based level number
    pub level: u8,
    pub owner_role: String,
    #[serde(with = "crate::duration_millis")]
    pub sub_timeout: Duration,
    pub actions: Vec<EscalationAction>,
}

/// Leveled fallback procedure opened when a step breaches its deadline.
/// At most one open path exists per step at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPath {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    pub levels: Vec<EscalationLevel>,
    /// Index into `levels` of the level currently in charge
    pub current_level: usize,
    pub level_entered_at: DateTime<Utc>,
    pub success_criteria: Vec<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationPath {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn current(&self) -> Option<&EscalationLevel> {
        self.levels.get(self.current_level)
    }

    /// Whether the current level's sub-timeout has lapsed at `now`
    pub fn level_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self.current() {
            Some(level) => {
                let elapsed = now
                    .signed_duration_since(self.level_entered_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                elapsed >= level.sub_timeout
            }
            None => true,
        }
    }

    pub fn on_last_level(&self) -> bool {
        self.current_level + 1 >= self.levels.len()
    }

    /// Whether the final level carries an auto-reject action
    pub fn ends_in_auto_reject(&self) -> bool {
        self.levels
            .last()
            .map(|l| l.actions.contains(&EscalationAction::AutoReject))
            .unwrap_or(false)
    }
}
