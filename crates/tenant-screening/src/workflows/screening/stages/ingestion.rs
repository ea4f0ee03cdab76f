use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::domain::{AdditionalInfo, EmploymentStatus, ScreeningSubmission};
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError};

/// Market rent assumed when the submission does not name the unit's rent.
pub const DEFAULT_MONTHLY_RENT: u32 = 1500;

/// Normalized view of the submission consumed by downstream stages. Carries
/// only the last four SSN digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub ssn_last_four: String,
    pub date_of_birth: Option<NaiveDate>,
    pub state: String,
    pub employer_name: String,
    pub job_title: String,
    pub employment_status: EmploymentStatus,
    pub annual_income: u32,
    pub monthly_income: u32,
    pub years_employed: f32,
    /// Rent of the unit applied for.
    pub monthly_rent: u32,
    /// Rent currently paid, when rental history was provided.
    pub current_rent: Option<u32>,
    pub years_at_current: f32,
    pub has_rental_history: bool,
    pub disclosures: AdditionalInfo,
}

impl ApplicantProfile {
    /// Monthly income divided by the rent applied for.
    pub fn income_to_rent(&self) -> f32 {
        if self.monthly_rent == 0 {
            return 0.0;
        }
        self.monthly_income as f32 / self.monthly_rent as f32
    }

    /// Share of monthly income consumed by the applicant's current rent.
    pub fn current_rent_burden(&self) -> Option<f32> {
        let rent = self.current_rent?;
        if self.monthly_income == 0 {
            return None;
        }
        Some(rent as f32 / self.monthly_income as f32)
    }
}

/// Validates and normalizes the raw submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionStage;

#[async_trait]
impl Stage for IngestionStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        normalize(input.submission()).map(StagePayload::Profile)
    }
}

pub fn normalize(submission: &ScreeningSubmission) -> Result<ApplicantProfile, StageError> {
    let applicant = &submission.applicant;
    let first = applicant.first_name.trim();
    let last = applicant.last_name.trim();
    if first.is_empty() || last.is_empty() {
        return Err(StageError::InvalidInput(
            "applicant first and last name are required".to_string(),
        ));
    }

    let ssn = digits(&applicant.ssn);
    if ssn.len() != 9 {
        return Err(StageError::InvalidInput(
            "SSN must contain exactly nine digits".to_string(),
        ));
    }

    let email = applicant.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(StageError::InvalidInput(format!(
            "email `{email}` is not an address"
        )));
    }

    let employment = &submission.employment;
    let rental = submission.rental_history.as_ref();

    Ok(ApplicantProfile {
        full_name: format!("{first} {last}"),
        email,
        phone: normalize_phone(&applicant.phone),
        ssn_last_four: ssn[5..].to_string(),
        date_of_birth: NaiveDate::parse_from_str(applicant.date_of_birth.trim(), "%Y-%m-%d").ok(),
        state: applicant.current_address.state.trim().to_ascii_uppercase(),
        employer_name: employment.employer_name.trim().to_string(),
        job_title: employment.job_title.trim().to_string(),
        employment_status: employment.employment_status,
        annual_income: employment.annual_income,
        monthly_income: employment.annual_income / 12,
        years_employed: employment.years_employed.max(0.0),
        monthly_rent: submission
            .desired_monthly_rent
            .filter(|rent| *rent > 0)
            .unwrap_or(DEFAULT_MONTHLY_RENT),
        current_rent: rental.and_then(|history| history.monthly_rent),
        years_at_current: rental
            .and_then(|history| history.years_at_current)
            .unwrap_or(0.0)
            .max(0.0),
        has_rental_history: rental.is_some(),
        disclosures: submission.additional_info,
    })
}

pub(crate) fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// `(XXX) XXX-XXXX` for ten-digit numbers, with a leading US country code
/// dropped. Anything else is returned as bare digits.
pub fn normalize_phone(raw: &str) -> String {
    let digits = digits(raw);
    let local = match digits.len() {
        11 if digits.starts_with('1') => &digits[1..],
        _ => digits.as_str(),
    };

    if local.len() == 10 {
        format!("({}) {}-{}", &local[..3], &local[3..6], &local[6..])
    } else {
        local.to_string()
    }
}
