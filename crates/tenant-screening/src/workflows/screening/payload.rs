use serde::{Deserialize, Serialize};

use super::stages::audit::AuditRecord;
use super::stages::bias::BiasReview;
use super::stages::compliance::ComplianceReview;
use super::stages::credit::CreditReport;
use super::stages::decision::DecisionOutcome;
use super::stages::fraud::FraudAssessment;
use super::stages::identity::IdentityAssessment;
use super::stages::ingestion::ApplicantProfile;
use super::stages::risk::RiskAssessment;

/// Typed output of a successful stage.
///
/// `Custom` carries arbitrary JSON for stages registered outside the
/// standard pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Profile(ApplicantProfile),
    Identity(IdentityAssessment),
    Credit(CreditReport),
    Fraud(FraudAssessment),
    Risk(RiskAssessment),
    Decision(DecisionOutcome),
    Compliance(ComplianceReview),
    Bias(BiasReview),
    Audit(AuditRecord),
    Custom(serde_json::Value),
}

impl StagePayload {
    pub const fn kind(&self) -> &'static str {
        match self {
            StagePayload::Profile(_) => "profile",
            StagePayload::Identity(_) => "identity",
            StagePayload::Credit(_) => "credit",
            StagePayload::Fraud(_) => "fraud",
            StagePayload::Risk(_) => "risk",
            StagePayload::Decision(_) => "decision",
            StagePayload::Compliance(_) => "compliance",
            StagePayload::Bias(_) => "bias",
            StagePayload::Audit(_) => "audit",
            StagePayload::Custom(_) => "custom",
        }
    }

    /// One-line description used by audit trails and CLI rendering.
    pub fn summary(&self) -> String {
        match self {
            StagePayload::Profile(profile) => format!(
                "{} ({}), income ${}/yr",
                profile.full_name,
                profile.employment_status.label(),
                profile.annual_income
            ),
            StagePayload::Identity(identity) => format!(
                "{} (confidence {:.2})",
                identity.status.label(),
                identity.confidence
            ),
            StagePayload::Credit(report) => format!(
                "score {} from {}, {} accounts",
                report.credit_score, report.bureau, report.total_accounts
            ),
            StagePayload::Fraud(fraud) => format!(
                "{} fraud risk (score {:.2}, {} indicator(s))",
                fraud.level.label(),
                fraud.fraud_score,
                fraud.indicators.len()
            ),
            StagePayload::Risk(risk) => {
                format!("risk score {} ({})", risk.risk_score, risk.tier.label())
            }
            StagePayload::Decision(decision) => decision.summary(),
            StagePayload::Compliance(review) => format!(
                "{}{}",
                review.status.label(),
                if review.adverse_action_required {
                    ", adverse action notice required"
                } else {
                    ""
                }
            ),
            StagePayload::Bias(review) => format!(
                "fairness {:.2}, {}",
                review.fairness_score,
                if review.bias_detected {
                    "bias indicators present"
                } else {
                    "no bias detected"
                }
            ),
            StagePayload::Audit(record) => format!(
                "{} covering {} stage(s)",
                record.audit_id,
                record.stage_log.len()
            ),
            StagePayload::Custom(value) => value.to_string(),
        }
    }
}
