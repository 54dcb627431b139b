//! Risk policy engine
//!
//! Maps a workflow's priority and declared context attributes to a risk
//! tier, a recommended control strategy, and a synthesized approval
//! policy. Deterministic and side-effect-free given its inputs and the
//! shared weighting config.

use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use signoff_core::{
    ApprovalPolicy, AssessmentContext, ControlStrategy, EscalationTrigger, PolicyCondition,
    Priority, RiskAssessment, RiskTier,
};

/// Assessment failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssessmentError {
    /// Context attribute outside its valid range; values are never clamped
    #[error("invalid assessment input: {field} = {value} (expected {expected})")]
    InvalidInput {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Shared weighting configuration
///
/// Priority bases are strictly increasing so that, for fixed context, a
/// higher priority never lowers the computed score.
#[derive(Debug, Clone)]
pub struct RiskWeights {
    pub low_base: f64,
    pub medium_base: f64,
    pub high_base: f64,
    pub urgent_base: f64,
    pub business_impact: f64,
    pub technical_impact: f64,
    pub data_sensitivity: f64,
    /// Budget ceiling guarding critical-tier admission
    pub critical_budget_ceiling: f64,
    /// Budget ceiling guarding high-tier admission
    pub high_budget_ceiling: f64,
    /// Budget bound under which auto-approval conditions apply
    pub auto_approval_budget: f64,
    /// Security level bound under which auto-approval conditions apply
    pub auto_approval_security_level: u8,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            low_base: 10.0,
            medium_base: 25.0,
            high_base: 40.0,
            urgent_base: 55.0,
            business_impact: 0.25,
            technical_impact: 0.15,
            data_sensitivity: 0.10,
            critical_budget_ceiling: 500_000.0,
            high_budget_ceiling: 1_000_000.0,
            auto_approval_budget: 10_000.0,
            auto_approval_security_level: 2,
        }
    }
}

impl RiskWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_approval_budget(mut self, bound: f64) -> Self {
        self.auto_approval_budget = bound;
        self
    }

    pub fn with_critical_budget_ceiling(mut self, ceiling: f64) -> Self {
        self.critical_budget_ceiling = ceiling;
        self
    }

    fn base_for(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low_base,
            Priority::Medium => self.medium_base,
            Priority::High => self.high_base,
            Priority::Urgent => self.urgent_base,
        }
    }
}

/// Computes risk assessments and synthesizes approval policy
#[derive(Debug, Clone, Default)]
pub struct RiskPolicyEngine {
    weights: RiskWeights,
}

impl RiskPolicyEngine {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// Assess one workflow. The score is a weighted sum of the
    /// priority-derived base and the declared context factors, capped at
    /// 100; the tier falls out of the fixed bands.
    pub fn assess(
        &self,
        workflow_id: Uuid,
        ctx: &AssessmentContext,
        priority: Priority,
    ) -> Result<RiskAssessment, AssessmentError> {
        validate(ctx)?;

        let raw = self.weights.base_for(priority)
            + ctx.business_impact * self.weights.business_impact
            + ctx.technical_impact * self.weights.technical_impact
            + ctx.data_sensitivity * self.weights.data_sensitivity;
        let risk_score = raw.min(100.0);
        let tier = RiskTier::from_score(risk_score);
        let strategy = ControlStrategy::for_tier(tier);
        let policy = self.synthesize_policy(tier);

        debug!(
            %workflow_id,
            risk_score,
            ?tier,
            ?strategy,
            "risk assessment computed"
        );

        Ok(RiskAssessment {
            workflow_id,
            risk_score,
            tier,
            strategy,
            policy,
            context: ctx.clone(),
            assessed_at: Utc::now(),
        })
    }

    /// Policy synthesis per tier: critical mandates a senior-approval step
    /// and disables auto-approval; low/medium tiers get budget- and
    /// security-bounded auto-approval conditions; escalation triggers are
    /// always populated.
    fn synthesize_policy(&self, tier: RiskTier) -> ApprovalPolicy {
        let auto_approval = match tier {
            RiskTier::Low | RiskTier::Medium => vec![
                PolicyCondition::ResourceBound {
                    resource: "budget".into(),
                    limit: self.weights.auto_approval_budget,
                },
                PolicyCondition::SecurityLevel {
                    max_level: self.weights.auto_approval_security_level,
                },
            ],
            RiskTier::High | RiskTier::Critical => vec![],
        };

        let rejection = match tier {
            RiskTier::Critical => vec![PolicyCondition::ResourceBound {
                resource: "budget".into(),
                limit: self.weights.critical_budget_ceiling,
            }],
            RiskTier::High => vec![PolicyCondition::ResourceBound {
                resource: "budget".into(),
                limit: self.weights.high_budget_ceiling,
            }],
            RiskTier::Medium | RiskTier::Low => vec![],
        };

        ApprovalPolicy {
            mandatory_senior_approval: tier == RiskTier::Critical,
            auto_approval,
            rejection,
            escalation_triggers: EscalationTrigger::ALL.to_vec(),
        }
    }
}

fn validate(ctx: &AssessmentContext) -> Result<(), AssessmentError> {
    let pct_fields = [
        ("business_impact", ctx.business_impact),
        ("technical_impact", ctx.technical_impact),
        ("data_sensitivity", ctx.data_sensitivity),
    ];
    for (field, value) in pct_fields {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(AssessmentError::InvalidInput {
                field,
                value,
                expected: "0..=100",
            });
        }
    }
    if !ctx.budget_at_stake.is_finite() || ctx.budget_at_stake < 0.0 {
        return Err(AssessmentError::InvalidInput {
            field: "budget_at_stake",
            value: ctx.budget_at_stake,
            expected: ">= 0",
        });
    }
    if ctx.security_level > 5 {
        return Err(AssessmentError::InvalidInput {
            field: "security_level",
            value: f64::from(ctx.security_level),
            expected: "0..=5",
        });
    }
    Ok(())
}
