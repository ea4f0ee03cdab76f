use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::compliance::words;
use super::decision::{DecisionOutcome, ScreeningDecision};
use super::risk::LOW_RISK_MAX;
use super::{decision_of, RiskLevel, DECISION};

/// Attributes that commonly proxy for protected classes.
const PROXY_TERMS: [&str; 7] = [
    "zip",
    "neighborhood",
    "age",
    "first name",
    "surname",
    "accent",
    "language",
];

const PENALTY_PER_INDICATOR: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    None,
    ProxyDiscrimination,
    InconsistentTreatment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReview {
    pub bias_detected: bool,
    pub bias_type: BiasType,
    /// 1.0 is fully consistent with the stated criteria.
    pub fairness_score: f32,
    pub risk_level: RiskLevel,
    pub indicators: Vec<String>,
    pub mitigation: Vec<String>,
}

/// Looks for proxy attributes in the decision's stated factors and for
/// outcomes that contradict the applicant's own scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiasStage;

impl BiasStage {
    pub fn review(decision: &DecisionOutcome) -> BiasReview {
        let mut indicators = Vec::new();
        let mut mitigation = Vec::new();
        let mut bias_type = BiasType::None;

        let stated: Vec<String> = decision
            .key_factors
            .iter()
            .chain(decision.conditions.iter())
            .map(|text| words(text))
            .collect();
        for term in PROXY_TERMS {
            let needle = format!(" {term} ");
            if stated.iter().any(|text| format!("{text} ").contains(&needle)) {
                indicators.push(format!("decision factors reference `{term}`"));
                bias_type = BiasType::ProxyDiscrimination;
            }
        }
        if bias_type == BiasType::ProxyDiscrimination {
            mitigation.push("Remove proxy attributes from decision factors".to_string());
        }

        let strong_credit = decision.credit_score.is_some_and(|score| score >= 650);
        let low_risk = decision.risk_score.is_some_and(|score| score <= LOW_RISK_MAX);
        let verification_denial = decision.key_factors.iter().any(|factor| {
            let factor = words(factor);
            factor.contains(" identity") || factor.contains(" fraud")
        });
        if decision.decision == ScreeningDecision::Deny
            && strong_credit
            && low_risk
            && !verification_denial
        {
            indicators.push("denial is inconsistent with low-risk scores".to_string());
            mitigation.push("Escalate for second-level review".to_string());
            if bias_type == BiasType::None {
                bias_type = BiasType::InconsistentTreatment;
            }
        }

        let fairness_score = (1.0 - PENALTY_PER_INDICATOR * indicators.len() as f32).max(0.0);
        let risk_level = match indicators.len() {
            0 => RiskLevel::Low,
            1 => RiskLevel::Moderate,
            _ => RiskLevel::High,
        };

        BiasReview {
            bias_detected: !indicators.is_empty(),
            bias_type,
            fairness_score,
            risk_level,
            indicators,
            mitigation,
        }
    }
}

#[async_trait]
impl Stage for BiasStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let decision =
            decision_of(input).ok_or_else(|| StageError::MissingDependency(DECISION.to_string()))?;
        Ok(StagePayload::Bias(Self::review(decision)))
    }
}
