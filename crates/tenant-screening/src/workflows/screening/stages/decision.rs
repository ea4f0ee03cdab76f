use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::credit::CreditReport;
use super::fraud::FraudAssessment;
use super::identity::{IdentityAssessment, VerificationStatus};
use super::risk::{RiskAssessment, LOW_RISK_MAX, MODERATE_RISK_MAX};
use super::{
    credit_of, fraud_of, identity_of, profile_of, risk_of, RiskLevel, CREDIT, FRAUD, IDENTITY,
    INGESTION, RISK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningDecision {
    Approve,
    ConditionalApprove,
    Deny,
    ManualReview,
}

impl ScreeningDecision {
    pub const fn label(self) -> &'static str {
        match self {
            ScreeningDecision::Approve => "approve",
            ScreeningDecision::ConditionalApprove => "conditional approve",
            ScreeningDecision::Deny => "deny",
            ScreeningDecision::ManualReview => "manual review",
        }
    }

    /// Decisions that require an FCRA adverse action notice.
    pub const fn is_adverse(self) -> bool {
        matches!(
            self,
            ScreeningDecision::Deny | ScreeningDecision::ConditionalApprove
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: ScreeningDecision,
    /// Percent confidence in the decision.
    pub confidence: u8,
    pub credit_score: Option<u16>,
    pub risk_score: Option<u16>,
    pub key_factors: Vec<String>,
    pub conditions: Vec<String>,
    /// Upstream stages whose results were missing or errored.
    pub unavailable_inputs: Vec<String>,
    pub reasoning: String,
}

impl DecisionOutcome {
    pub fn summary(&self) -> String {
        match self.decision {
            ScreeningDecision::Approve => "application approved".to_string(),
            ScreeningDecision::ConditionalApprove => {
                format!("conditional approval: {}", self.conditions.join(", "))
            }
            ScreeningDecision::Deny => format!("denied: {}", self.key_factors.join("; ")),
            ScreeningDecision::ManualReview => format!("manual review required: {}", self.reasoning),
        }
    }
}

/// Credit and risk thresholds applied by [`DecisionStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPolicy {
    pub approve_min_credit: u16,
    pub deny_below_credit: u16,
    pub low_risk_max: u16,
    pub moderate_risk_max: u16,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            approve_min_credit: 650,
            deny_below_credit: 580,
            low_risk_max: LOW_RISK_MAX,
            moderate_risk_max: MODERATE_RISK_MAX,
        }
    }
}

/// Terminal stage combining identity, credit, fraud, and risk into a
/// decision. Never fails: unavailable inputs resolve to manual review unless
/// the inputs that did arrive already warrant a denial.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionStage {
    policy: DecisionPolicy,
}

/// Upstream results available to the decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionInputs<'a> {
    pub identity: Option<&'a IdentityAssessment>,
    pub credit: Option<&'a CreditReport>,
    pub fraud: Option<&'a FraudAssessment>,
    pub risk: Option<&'a RiskAssessment>,
}

impl DecisionStage {
    pub fn with_policy(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn decide(&self, inputs: DecisionInputs<'_>, unavailable_inputs: Vec<String>) -> DecisionOutcome {
        let policy = &self.policy;
        let credit_score = inputs.credit.map(|report| report.credit_score);
        let risk_score = inputs.risk.map(|risk| risk.risk_score);

        let mut denials = Vec::new();
        if let Some(identity) = inputs.identity {
            if identity.status == VerificationStatus::Failed {
                denials.push("identity could not be verified".to_string());
            }
        }
        if let Some(score) = credit_score {
            if score < policy.deny_below_credit {
                denials.push(format!(
                    "credit score {score} below minimum {}",
                    policy.deny_below_credit
                ));
            }
        }
        if let Some(fraud) = inputs.fraud {
            if fraud.level == RiskLevel::High {
                denials.push(format!("high fraud risk (score {:.2})", fraud.fraud_score));
            }
        }
        if let Some(score) = risk_score {
            if score > policy.moderate_risk_max {
                denials.push(format!(
                    "risk score {score} exceeds {}",
                    policy.moderate_risk_max
                ));
            }
        }

        if !denials.is_empty() {
            return DecisionOutcome {
                decision: ScreeningDecision::Deny,
                confidence: 90,
                credit_score,
                risk_score,
                reasoning: format!("denied on {} adverse factor(s)", denials.len()),
                key_factors: denials,
                conditions: Vec::new(),
                unavailable_inputs,
            };
        }

        if !unavailable_inputs.is_empty() {
            return DecisionOutcome {
                decision: ScreeningDecision::ManualReview,
                confidence: 0,
                credit_score,
                risk_score,
                key_factors: Vec::new(),
                conditions: Vec::new(),
                reasoning: format!("missing inputs: {}", unavailable_inputs.join(", ")),
                unavailable_inputs,
            };
        }

        let mut key_factors = Vec::new();
        let mut conditions = Vec::new();

        if let Some(score) = credit_score {
            if score < policy.approve_min_credit {
                key_factors.push(format!(
                    "credit score {score} below {}",
                    policy.approve_min_credit
                ));
                conditions.push("Additional security deposit".to_string());
            }
        }
        if let Some(score) = risk_score {
            if score > policy.low_risk_max {
                key_factors.push(format!("moderate risk score {score}"));
                conditions.push("Qualified co-signer or guarantor".to_string());
            }
        }
        if let Some(fraud) = inputs.fraud {
            if fraud.level == RiskLevel::Moderate || fraud.requires_manual_review {
                key_factors.push(format!("moderate fraud risk (score {:.2})", fraud.fraud_score));
                conditions.extend(
                    fraud
                        .indicators
                        .iter()
                        .map(|indicator| indicator.recommendation.clone()),
                );
            }
        }
        if let Some(identity) = inputs.identity {
            if identity.status == VerificationStatus::NeedsReview {
                key_factors.push("identity needs additional review".to_string());
                conditions.push("Provide supplemental identity documents".to_string());
            }
        }

        if !conditions.is_empty() {
            let mut seen = HashSet::new();
            conditions.retain(|condition| seen.insert(condition.clone()));
            return DecisionOutcome {
                decision: ScreeningDecision::ConditionalApprove,
                confidence: 75,
                credit_score,
                risk_score,
                reasoning: format!("approved with {} condition(s)", conditions.len()),
                key_factors,
                conditions,
                unavailable_inputs,
            };
        }

        if let Some(score) = credit_score {
            key_factors.push(format!("credit score {score} meets minimum"));
        }
        if let Some(score) = risk_score {
            key_factors.push(format!("low risk score {score}"));
        }

        DecisionOutcome {
            decision: ScreeningDecision::Approve,
            confidence: 95,
            credit_score,
            risk_score,
            reasoning: "all screening criteria met".to_string(),
            key_factors,
            conditions,
            unavailable_inputs,
        }
    }
}

#[async_trait]
impl Stage for DecisionStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let inputs = DecisionInputs {
            identity: identity_of(input),
            credit: credit_of(input),
            fraud: fraud_of(input),
            risk: risk_of(input),
        };

        let unavailable_inputs = [
            (INGESTION, profile_of(input).is_none()),
            (IDENTITY, inputs.identity.is_none()),
            (CREDIT, inputs.credit.is_none()),
            (FRAUD, inputs.fraud.is_none()),
            (RISK, inputs.risk.is_none()),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(stage, _)| stage.to_string())
        .collect();

        Ok(StagePayload::Decision(self.decide(inputs, unavailable_inputs)))
    }
}
