//! Risk tiers, assessment context, and synthesized approval policy

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discrete risk classification derived from a numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Fixed score bands: >=90 critical, >=70 high, >=40 medium, else low
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            RiskTier::Critical
        } else if score >= 70.0 {
            RiskTier::High
        } else if score >= 40.0 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

/// Recommended control strategy for a risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStrategy {
    Prevention,
    Mitigation,
    Acceptance,
    /// Not produced by the fixed tier mapping; reachable through policy
    /// extensions
    Transfer,
}

impl ControlStrategy {
    pub fn for_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Critical => ControlStrategy::Prevention,
            RiskTier::High | RiskTier::Medium => ControlStrategy::Mitigation,
            RiskTier::Low => ControlStrategy::Acceptance,
        }
    }
}

/// Caller-declared context attributes feeding the risk score
///
/// Impact factors are percentages (0-100); the budget is an absolute
/// amount. Values outside those ranges fail assessment, they are never
/// clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentContext {
    pub business_impact: f64,
    pub technical_impact: f64,
    pub data_sensitivity: f64,
    pub budget_at_stake: f64,
    /// 0 (public) .. 5 (restricted)
    pub security_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Default for AssessmentContext {
    fn default() -> Self {
        Self {
            business_impact: 0.0,
            technical_impact: 0.0,
            data_sensitivity: 0.0,
            budget_at_stake: 0.0,
            security_level: 0,
            region: None,
        }
    }
}

impl AssessmentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_business_impact(mut self, pct: f64) -> Self {
        self.business_impact = pct;
        self
    }

    pub fn with_technical_impact(mut self, pct: f64) -> Self {
        self.technical_impact = pct;
        self
    }

    pub fn with_data_sensitivity(mut self, pct: f64) -> Self {
        self.data_sensitivity = pct;
        self
    }

    pub fn with_budget_at_stake(mut self, amount: f64) -> Self {
        self.budget_at_stake = amount;
        self
    }

    pub fn with_security_level(mut self, level: u8) -> Self {
        self.security_level = level;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Typed policy condition, closed set with one total evaluator per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Holds while the wall clock is within [start_hour, end_hour) UTC
    TimeWindow { start_hour: u32, end_hour: u32 },
    /// Holds when the context declares one of the allowed regions
    Geo { allowed_regions: Vec<String> },
    /// Holds when the declared security level does not exceed the bound
    SecurityLevel { max_level: u8 },
    /// Holds when the named resource stays within its bound; the core
    /// knows the `budget` resource, unknown resources never hold
    ResourceBound { resource: String, limit: f64 },
}

impl PolicyCondition {
    /// Whether the condition is satisfied by the context at `now`
    pub fn holds(&self, ctx: &AssessmentContext, now: DateTime<Utc>) -> bool {
        match self {
            PolicyCondition::TimeWindow {
                start_hour,
                end_hour,
            } => {
                let hour = now.hour();
                hour >= *start_hour && hour < *end_hour
            }
            PolicyCondition::Geo { allowed_regions } => ctx
                .region
                .as_deref()
                .map(|r| allowed_regions.iter().any(|a| a == r))
                .unwrap_or(false),
            PolicyCondition::SecurityLevel { max_level } => ctx.security_level <= *max_level,
            PolicyCondition::ResourceBound { resource, limit } => match resource.as_str() {
                "budget" => ctx.budget_at_stake <= *limit,
                _ => false,
            },
        }
    }

    /// Short label used in error messages and notifications
    pub fn label(&self) -> String {
        match self {
            PolicyCondition::TimeWindow {
                start_hour,
                end_hour,
            } => format!("time_window {start_hour:02}:00-{end_hour:02}:00"),
            PolicyCondition::Geo { allowed_regions } => {
                format!("geo [{}]", allowed_regions.join(", "))
            }
            PolicyCondition::SecurityLevel { max_level } => {
                format!("security_level <= {max_level}")
            }
            PolicyCondition::ResourceBound { resource, limit } => {
                format!("{resource} <= {limit}")
            }
        }
    }
}

/// Situations that escalate a workflow regardless of tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    RiskIncrease,
    MitigationFailure,
    TimeWindowBreach,
    BudgetOverrun,
}

impl EscalationTrigger {
    pub const ALL: [EscalationTrigger; 4] = [
        EscalationTrigger::RiskIncrease,
        EscalationTrigger::MitigationFailure,
        EscalationTrigger::TimeWindowBreach,
        EscalationTrigger::BudgetOverrun,
    ];
}

/// Approval policy synthesized from a risk assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Critical tier mandates an extra senior-approval step
    pub mandatory_senior_approval: bool,
    /// All conditions must hold for bounded auto-approval; empty disables
    pub auto_approval: Vec<PolicyCondition>,
    /// Admission guards: every condition must hold, a violated guard
    /// rejects the request
    pub rejection: Vec<PolicyCondition>,
    /// Always populated regardless of tier
    pub escalation_triggers: Vec<EscalationTrigger>,
}

impl ApprovalPolicy {
    pub fn auto_approval_allowed(&self, ctx: &AssessmentContext, now: DateTime<Utc>) -> bool {
        !self.auto_approval.is_empty() && self.auto_approval.iter().all(|c| c.holds(ctx, now))
    }

    /// First violated admission guard, if any
    pub fn violated_guard(
        &self,
        ctx: &AssessmentContext,
        now: DateTime<Utc>,
    ) -> Option<&PolicyCondition> {
        self.rejection.iter().find(|c| !c.holds(ctx, now))
    }
}

/// Result of assessing one workflow's risk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub workflow_id: Uuid,
    /// 0-100
    pub risk_score: f64,
    pub tier: RiskTier,
    pub strategy: ControlStrategy,
    pub policy: ApprovalPolicy,
    pub context: AssessmentContext,
    pub assessed_at: DateTime<Utc>,
}
