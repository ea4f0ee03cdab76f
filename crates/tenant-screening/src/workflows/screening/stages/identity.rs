use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::domain::ApplicantDetails;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

use super::ingestion::digits;

const SSN_WEIGHT: f32 = 0.35;
const DOB_WEIGHT: f32 = 0.20;
const NAME_WEIGHT: f32 = 0.15;
const ADDRESS_WEIGHT: f32 = 0.15;
const CONTACT_WEIGHT: f32 = 0.15;

/// Minimum confidence for the identity to count as confirmed.
pub const CONFIRMATION_THRESHOLD: f32 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    LikelyVerified,
    NeedsReview,
    Failed,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::LikelyVerified => "likely verified",
            VerificationStatus::NeedsReview => "needs review",
            VerificationStatus::Failed => "verification failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityChecks {
    pub ssn_valid: bool,
    pub dob_valid: bool,
    pub name_consistent: bool,
    pub address_complete: bool,
    pub contact_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAssessment {
    pub status: VerificationStatus,
    pub confidence: f32,
    pub identity_confirmed: bool,
    pub checks: IdentityChecks,
    pub issues: Vec<String>,
}

/// Format and plausibility checks over the applicant's identifying details.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStage {
    as_of: Option<NaiveDate>,
}

impl IdentityStage {
    /// Evaluate ages against a fixed date instead of today.
    pub fn as_of(date: NaiveDate) -> Self {
        Self { as_of: Some(date) }
    }

    pub fn assess(&self, applicant: &ApplicantDetails) -> IdentityAssessment {
        let today = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let mut issues = Vec::new();

        let ssn_valid = valid_ssn(&applicant.ssn);
        if !ssn_valid {
            issues.push("SSN is not a valid issued number".to_string());
        }

        let dob_valid = match NaiveDate::parse_from_str(applicant.date_of_birth.trim(), "%Y-%m-%d") {
            Ok(dob) => {
                let age = age_on(dob, today);
                if (18..=120).contains(&age) {
                    true
                } else {
                    issues.push(format!("applicant age {age} is outside 18-120"));
                    false
                }
            }
            Err(_) => {
                issues.push("date of birth is not a valid YYYY-MM-DD date".to_string());
                false
            }
        };

        let name_consistent = valid_name(&applicant.first_name) && valid_name(&applicant.last_name);
        if !name_consistent {
            issues.push("name contains unexpected characters".to_string());
        }

        let address = &applicant.current_address;
        let zip = digits(&address.zip);
        let address_complete = !address.street.trim().is_empty()
            && !address.city.trim().is_empty()
            && address.state.trim().len() == 2
            && (zip.len() == 5 || zip.len() == 9);
        if !address_complete {
            issues.push("current address is incomplete".to_string());
        }

        let contact_valid = valid_email(&applicant.email) && digits(&applicant.phone).len() >= 10;
        if !contact_valid {
            issues.push("email or phone number is malformed".to_string());
        }

        let checks = IdentityChecks {
            ssn_valid,
            dob_valid,
            name_consistent,
            address_complete,
            contact_valid,
        };

        let confidence = [
            (ssn_valid, SSN_WEIGHT),
            (dob_valid, DOB_WEIGHT),
            (name_consistent, NAME_WEIGHT),
            (address_complete, ADDRESS_WEIGHT),
            (contact_valid, CONTACT_WEIGHT),
        ]
        .iter()
        .filter(|(passed, _)| *passed)
        .map(|(_, weight)| weight)
        .sum::<f32>()
        .min(1.0);

        let status = if !ssn_valid {
            VerificationStatus::Failed
        } else if confidence >= 0.95 {
            VerificationStatus::Verified
        } else if confidence >= 0.80 {
            VerificationStatus::LikelyVerified
        } else if confidence >= 0.50 {
            VerificationStatus::NeedsReview
        } else {
            VerificationStatus::Failed
        };

        IdentityAssessment {
            status,
            confidence,
            identity_confirmed: status != VerificationStatus::Failed
                && confidence >= CONFIRMATION_THRESHOLD,
            checks,
            issues,
        }
    }
}

#[async_trait]
impl Stage for IdentityStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        Ok(StagePayload::Identity(self.assess(&input.submission().applicant)))
    }
}

/// Nine digits with no all-zero group, and an area outside 000, 666 and 900-999.
pub fn valid_ssn(raw: &str) -> bool {
    let ssn = digits(raw);
    if ssn.len() != 9 {
        return false;
    }
    let area = &ssn[..3];
    let group = &ssn[3..5];
    let serial = &ssn[5..];
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

fn valid_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\'' | '.'))
}

fn valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}
