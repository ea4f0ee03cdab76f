use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::credit::CreditReport;
use super::ingestion::ApplicantProfile;
use super::{credit_of, profile_of, RiskLevel, CREDIT, INGESTION};

/// Neutral starting point on the 0-1000 scale.
pub const BASE_RISK: i32 = 500;
pub const MAX_RISK: i32 = 1000;
/// Upper bound of the low-risk tier.
pub const LOW_RISK_MAX: u16 = 300;
/// Upper bound of the moderate-risk tier.
pub const MODERATE_RISK_MAX: u16 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    CreditScore,
    IncomeToRent,
    RentalTenure,
    EvictionDisclosure,
    BankruptcyDisclosure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: RiskFactorKind,
    /// Positive points raise risk.
    pub points: i16,
    pub notes: String,
}

/// Applicant risk on a 0-1000 scale where higher is riskier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u16,
    pub tier: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    pub fn factor(&self, kind: RiskFactorKind) -> Option<&RiskFactor> {
        self.factors.iter().find(|factor| factor.factor == kind)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskStage;

impl RiskStage {
    pub fn assess(profile: &ApplicantProfile, credit: &CreditReport) -> RiskAssessment {
        let mut factors = Vec::new();

        let score = credit.credit_score;
        let credit_points = match score {
            750.. => -150,
            700..=749 => -100,
            650..=699 => -50,
            600..=649 => 50,
            _ => 150,
        };
        factors.push(RiskFactor {
            factor: RiskFactorKind::CreditScore,
            points: credit_points,
            notes: format!("credit score {score}"),
        });

        let ratio = profile.income_to_rent();
        let income_points = if ratio >= 3.5 {
            -150
        } else if ratio >= 3.0 {
            -100
        } else if ratio >= 2.5 {
            0
        } else {
            100
        };
        factors.push(RiskFactor {
            factor: RiskFactorKind::IncomeToRent,
            points: income_points,
            notes: format!(
                "monthly income is {ratio:.2}x rent of ${}",
                profile.monthly_rent
            ),
        });

        let years = profile.years_at_current;
        let tenure_points = if years >= 2.0 {
            -50
        } else if years >= 1.0 {
            -25
        } else {
            25
        };
        factors.push(RiskFactor {
            factor: RiskFactorKind::RentalTenure,
            points: tenure_points,
            notes: format!("{years:.1} years at current residence"),
        });

        if profile.disclosures.eviction_history {
            factors.push(RiskFactor {
                factor: RiskFactorKind::EvictionDisclosure,
                points: 100,
                notes: "applicant disclosed a prior eviction".to_string(),
            });
        }
        if profile.disclosures.bankruptcy_history {
            factors.push(RiskFactor {
                factor: RiskFactorKind::BankruptcyDisclosure,
                points: 75,
                notes: "applicant disclosed a prior bankruptcy".to_string(),
            });
        }

        let raw: i32 = BASE_RISK + factors.iter().map(|factor| i32::from(factor.points)).sum::<i32>();
        let risk_score = raw.clamp(0, MAX_RISK) as u16;

        let tier = if risk_score <= LOW_RISK_MAX {
            RiskLevel::Low
        } else if risk_score <= MODERATE_RISK_MAX {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        };

        RiskAssessment {
            risk_score,
            tier,
            factors,
        }
    }
}

#[async_trait]
impl Stage for RiskStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let profile =
            profile_of(input).ok_or_else(|| StageError::MissingDependency(INGESTION.to_string()))?;
        let credit =
            credit_of(input).ok_or_else(|| StageError::MissingDependency(CREDIT.to_string()))?;

        Ok(StagePayload::Risk(Self::assess(profile, credit)))
    }
}
