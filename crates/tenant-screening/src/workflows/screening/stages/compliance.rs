use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::decision::{DecisionOutcome, ScreeningDecision};
use super::{decision_of, DECISION};

/// Fair Housing Act protected classes and common stand-ins. Matched as word
/// prefixes.
const PROTECTED_TERMS: [&str; 10] = [
    "race",
    "color",
    "religion",
    "national origin",
    "sex",
    "familial status",
    "disability",
    "children",
    "pregnan",
    "handicap",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NeedsReview,
    Violation,
}

impl ComplianceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::NeedsReview => "needs review",
            ComplianceStatus::Violation => "violation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReview {
    pub status: ComplianceStatus,
    pub fcra_compliant: bool,
    pub fair_housing_compliant: bool,
    pub adverse_action_required: bool,
    pub violations: Vec<String>,
    pub required_actions: Vec<String>,
}

/// FCRA adverse-action and Fair Housing review of the decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceStage;

impl ComplianceStage {
    pub fn review(decision: &DecisionOutcome) -> ComplianceReview {
        let mut violations = Vec::new();
        let mut required_actions = Vec::new();
        let adverse_action_required = decision.decision.is_adverse();

        let fcra_compliant = !adverse_action_required || !decision.key_factors.is_empty();
        if !fcra_compliant {
            violations.push("adverse action taken without disclosed principal reasons".to_string());
        }

        if adverse_action_required {
            required_actions.push("Send adverse action notice within 3 business days".to_string());
            if decision.credit_score.is_some() {
                required_actions.push(
                    "Disclose consumer reporting agency contact details and the right to a free report"
                        .to_string(),
                );
            }
        }

        let stated = decision
            .key_factors
            .iter()
            .chain(decision.conditions.iter())
            .chain(std::iter::once(&decision.reasoning))
            .map(|text| words(text))
            .collect::<Vec<_>>();
        let protected: Vec<&str> = PROTECTED_TERMS
            .iter()
            .copied()
            .filter(|term| {
                let needle = format!(" {term}");
                stated.iter().any(|text| text.contains(&needle))
            })
            .collect();
        let fair_housing_compliant = protected.is_empty();
        if !fair_housing_compliant {
            violations.push(format!(
                "decision references protected characteristics: {}",
                protected.join(", ")
            ));
        }

        let status = if !violations.is_empty() {
            ComplianceStatus::Violation
        } else if decision.decision == ScreeningDecision::ManualReview {
            required_actions.push("Complete manual review before notifying the applicant".to_string());
            ComplianceStatus::NeedsReview
        } else {
            ComplianceStatus::Compliant
        };

        ComplianceReview {
            status,
            fcra_compliant,
            fair_housing_compliant,
            adverse_action_required,
            violations,
            required_actions,
        }
    }
}

/// Lowercased text with punctuation collapsed to spaces and a leading space,
/// so terms only match at the start of a word.
pub(crate) fn words(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 1);
    normalized.push(' ');
    for c in text.chars() {
        if c.is_alphanumeric() {
            normalized.extend(c.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    normalized
}

#[async_trait]
impl Stage for ComplianceStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let decision =
            decision_of(input).ok_or_else(|| StageError::MissingDependency(DECISION.to_string()))?;
        Ok(StagePayload::Compliance(Self::review(decision)))
    }
}
