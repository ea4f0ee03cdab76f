use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a single screening run, formatted `SCR-YYYYMMDD-XXXXXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreeningId(pub String);

impl ScreeningId {
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d");
        let token = Uuid::new_v4().simple().to_string();
        let suffix = token[..8].to_ascii_uppercase();
        Self(format!("SCR-{stamp}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreeningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to an application at intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a screening context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl ScreeningStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScreeningStatus::Created => "created",
            ScreeningStatus::Running => "running",
            ScreeningStatus::Completed => "completed",
            ScreeningStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ScreeningStatus::Completed | ScreeningStatus::Failed)
    }

    /// Created -> Running -> Completed | Failed. A screening that never
    /// started may still be failed directly.
    pub const fn can_transition_to(self, next: ScreeningStatus) -> bool {
        matches!(
            (self, next),
            (ScreeningStatus::Created, ScreeningStatus::Running)
                | (ScreeningStatus::Created, ScreeningStatus::Failed)
                | (ScreeningStatus::Running, ScreeningStatus::Completed)
                | (ScreeningStatus::Running, ScreeningStatus::Failed)
        )
    }
}

impl fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw application data handed to the orchestrator. Immutable once a
/// screening starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSubmission {
    pub applicant: ApplicantDetails,
    pub employment: EmploymentDetails,
    #[serde(default)]
    pub rental_history: Option<RentalHistory>,
    #[serde(default)]
    pub additional_info: AdditionalInfo,
    /// Rent of the unit applied for. Stages fall back to a market default.
    #[serde(default)]
    pub desired_monthly_rent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub ssn: String,
    /// ISO-8601 date; validated by the identity stage rather than at intake.
    pub date_of_birth: String,
    pub current_address: Address,
}

impl ApplicantDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentStatus {
    FullTime,
    PartTime,
    SelfEmployed,
    Unemployed,
}

impl EmploymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EmploymentStatus::FullTime => "full-time",
            EmploymentStatus::PartTime => "part-time",
            EmploymentStatus::SelfEmployed => "self-employed",
            EmploymentStatus::Unemployed => "unemployed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmploymentDetails {
    #[serde(default)]
    pub employer_name: String,
    #[serde(default)]
    pub job_title: String,
    pub employment_status: EmploymentStatus,
    pub annual_income: u32,
    #[serde(default)]
    pub years_employed: f32,
    #[serde(default)]
    pub employer_phone: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalHistory {
    pub current_landlord: Option<String>,
    pub current_landlord_phone: Option<String>,
    pub monthly_rent: Option<u32>,
    pub years_at_current: Option<f32>,
    pub reason_for_leaving: Option<String>,
}

/// Self-reported disclosures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditionalInfo {
    pub pets: bool,
    pub smoker: bool,
    pub bankruptcy_history: bool,
    pub eviction_history: bool,
}

impl ScreeningSubmission {
    /// Presence checks applied at intake. Content validation belongs to the
    /// ingestion and identity stages.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        let required = [
            ("applicant.first_name", &self.applicant.first_name),
            ("applicant.last_name", &self.applicant.last_name),
            ("applicant.email", &self.applicant.email),
            ("applicant.ssn", &self.applicant.ssn),
            ("applicant.date_of_birth", &self.applicant.date_of_birth),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SubmissionError::MissingField(field));
            }
        }

        if self.desired_monthly_rent == Some(0) {
            return Err(SubmissionError::InvalidRent);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("desired monthly rent must be greater than zero")]
    InvalidRent,
}
