use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::domain::EmploymentStatus;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::credit::CreditReport;
use super::identity::IdentityAssessment;
use super::ingestion::ApplicantProfile;
use super::{credit_of, identity_of, profile_of, RiskLevel, CREDIT, INGESTION};

/// Rule families evaluated; each contributes at most one indicator.
const RULE_COUNT: f32 = 5.0;

/// Plausible salary band per job-title keyword, in dollars per year.
const TITLE_INCOME_BANDS: [(&str, u32, u32); 8] = [
    ("director", 80_000, 250_000),
    ("manager", 50_000, 150_000),
    ("engineer", 60_000, 200_000),
    ("developer", 60_000, 180_000),
    ("consultant", 60_000, 180_000),
    ("analyst", 45_000, 100_000),
    ("specialist", 45_000, 90_000),
    ("assistant", 30_000, 60_000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudIndicatorKind {
    IncomeInconsistentWithTitle,
    NewEmploymentHighIncome,
    SelfEmployedInconsistency,
    UnemployedWithIncome,
    IdentityUnconfirmed,
    ThinCreditFile,
    AllRecentAccounts,
    ExcessiveRentBurden,
    MinimalRentalHistory,
    Bankruptcy,
    LiensOrJudgments,
    ExcessiveInquiries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudIndicator {
    pub kind: FraudIndicatorKind,
    pub severity: f32,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub fraud_score: f32,
    pub level: RiskLevel,
    pub indicators: Vec<FraudIndicator>,
    pub requires_manual_review: bool,
}

/// Rule-based detection of inconsistencies between declared and reported data.
#[derive(Debug, Clone, Copy)]
pub struct FraudStage {
    manual_review_threshold: f32,
}

impl Default for FraudStage {
    fn default() -> Self {
        Self {
            manual_review_threshold: 0.6,
        }
    }
}

impl FraudStage {
    pub fn assess(
        &self,
        profile: &ApplicantProfile,
        identity: Option<&IdentityAssessment>,
        credit: &CreditReport,
    ) -> FraudAssessment {
        let indicators: Vec<FraudIndicator> = [
            income_rule(profile),
            employment_rule(profile, credit),
            identity_rule(identity, credit),
            rental_rule(profile),
            public_record_rule(credit),
        ]
        .into_iter()
        .flatten()
        .collect();

        let fraud_score = (indicators.iter().map(|indicator| indicator.severity).sum::<f32>()
            / RULE_COUNT)
            .min(1.0);

        let level = if fraud_score >= 0.7 {
            RiskLevel::High
        } else if fraud_score >= 0.4 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };

        FraudAssessment {
            fraud_score,
            level,
            requires_manual_review: fraud_score >= self.manual_review_threshold,
            indicators,
        }
    }
}

#[async_trait]
impl Stage for FraudStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let profile =
            profile_of(input).ok_or_else(|| StageError::MissingDependency(INGESTION.to_string()))?;
        let credit =
            credit_of(input).ok_or_else(|| StageError::MissingDependency(CREDIT.to_string()))?;

        Ok(StagePayload::Fraud(self.assess(profile, identity_of(input), credit)))
    }
}

fn indicator(
    kind: FraudIndicatorKind,
    severity: f32,
    description: String,
    recommendation: &str,
) -> Option<FraudIndicator> {
    Some(FraudIndicator {
        kind,
        severity,
        description,
        recommendation: recommendation.to_string(),
    })
}

fn income_rule(profile: &ApplicantProfile) -> Option<FraudIndicator> {
    let title = profile.job_title.to_ascii_lowercase();
    let (keyword, low, high) = TITLE_INCOME_BANDS
        .iter()
        .find(|(keyword, _, _)| title.contains(keyword))?;

    let income = profile.annual_income;
    if income > high + high / 2 || income < low / 2 {
        return indicator(
            FraudIndicatorKind::IncomeInconsistentWithTitle,
            0.6,
            format!("declared income ${income} is far outside the ${low}-${high} range for a {keyword}"),
            "Verify income with recent pay stubs or tax returns",
        );
    }
    None
}

fn employment_rule(profile: &ApplicantProfile, credit: &CreditReport) -> Option<FraudIndicator> {
    let income = profile.annual_income;
    match profile.employment_status {
        EmploymentStatus::Unemployed if income > 0 => indicator(
            FraudIndicatorKind::UnemployedWithIncome,
            0.5,
            format!("unemployed applicant declares ${income} annual income"),
            "Document the source of declared income",
        ),
        EmploymentStatus::SelfEmployed if income > 150_000 && credit.credit_score < 650 => indicator(
            FraudIndicatorKind::SelfEmployedInconsistency,
            0.7,
            format!(
                "self-employed income ${income} is inconsistent with credit score {}",
                credit.credit_score
            ),
            "Request two years of business tax returns",
        ),
        EmploymentStatus::FullTime | EmploymentStatus::PartTime
            if profile.years_employed < 0.5 && income > 100_000 =>
        {
            indicator(
                FraudIndicatorKind::NewEmploymentHighIncome,
                0.4,
                format!(
                    "${income} income after {:.1} years with the employer",
                    profile.years_employed
                ),
                "Confirm the offer letter and start date with the employer",
            )
        }
        _ => None,
    }
}

fn identity_rule(identity: Option<&IdentityAssessment>, credit: &CreditReport) -> Option<FraudIndicator> {
    if let Some(identity) = identity {
        if !identity.identity_confirmed {
            return indicator(
                FraudIndicatorKind::IdentityUnconfirmed,
                0.5,
                format!(
                    "identity confidence {:.2} below confirmation threshold",
                    identity.confidence
                ),
                "Collect government-issued photo identification",
            );
        }
    }

    if credit.total_accounts < 2 && credit.history_years < 2 {
        return indicator(
            FraudIndicatorKind::ThinCreditFile,
            0.6,
            format!(
                "{} account(s) over {} year(s) of history",
                credit.total_accounts, credit.history_years
            ),
            "Verify identity against an independent data source",
        );
    }

    if credit.total_accounts > 0 && credit.recent_accounts >= credit.total_accounts {
        return indicator(
            FraudIndicatorKind::AllRecentAccounts,
            0.7,
            format!("all {} accounts were opened recently", credit.total_accounts),
            "Review for synthetic identity patterns",
        );
    }

    None
}

fn rental_rule(profile: &ApplicantProfile) -> Option<FraudIndicator> {
    if let Some(burden) = profile.current_rent_burden() {
        if burden > 0.5 {
            return indicator(
                FraudIndicatorKind::ExcessiveRentBurden,
                0.4,
                format!("current rent consumes {:.0}% of monthly income", burden * 100.0),
                "Verify current rent with the landlord",
            );
        }
    }

    if profile.years_at_current < 0.25 {
        return indicator(
            FraudIndicatorKind::MinimalRentalHistory,
            0.3,
            "less than three months at the current residence".to_string(),
            "Request prior landlord references",
        );
    }

    None
}

fn public_record_rule(credit: &CreditReport) -> Option<FraudIndicator> {
    let records = &credit.public_records;
    if records.bankruptcies > 0 {
        return indicator(
            FraudIndicatorKind::Bankruptcy,
            0.8,
            format!("{} bankruptcy filing(s) on record", records.bankruptcies),
            "Review discharge status and filing dates",
        );
    }
    if records.liens > 0 || records.judgments > 0 {
        return indicator(
            FraudIndicatorKind::LiensOrJudgments,
            0.6,
            format!(
                "{} lien(s) and {} judgment(s) on record",
                records.liens, records.judgments
            ),
            "Confirm satisfaction of outstanding judgments",
        );
    }
    if credit.hard_inquiries >= 6 {
        return indicator(
            FraudIndicatorKind::ExcessiveInquiries,
            0.4,
            format!("{} hard inquiries on file", credit.hard_inquiries),
            "Ask the applicant about recent credit applications",
        );
    }
    None
}
