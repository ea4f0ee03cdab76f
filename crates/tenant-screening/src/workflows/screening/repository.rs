use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ScreeningId, ScreeningStatus, ScreeningSubmission};
use super::report::FinalReport;
use super::stages::decision::ScreeningDecision;

/// Application-facing status derived from the screening outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    PendingReview,
    Failed,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Processing => "processing",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::PendingReview => "pending_review",
            ApplicationStatus::Failed => "failed",
        }
    }

    pub fn from_report(report: &FinalReport) -> Self {
        if report.status == ScreeningStatus::Failed {
            return ApplicationStatus::Failed;
        }
        match report.decision().map(|outcome| outcome.decision) {
            Some(ScreeningDecision::Approve | ScreeningDecision::ConditionalApprove) => {
                ApplicationStatus::Approved
            }
            Some(ScreeningDecision::Deny) => ApplicationStatus::Rejected,
            Some(ScreeningDecision::ManualReview) | None => ApplicationStatus::PendingReview,
        }
    }

    /// Statuses from which a new screening may be started.
    pub const fn is_screenable(self) -> bool {
        matches!(self, ApplicationStatus::Pending | ApplicationStatus::Failed)
    }
}

/// Repository record pairing a submission with its latest screening.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningRecord {
    pub application_id: ApplicationId,
    pub submission: ScreeningSubmission,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub report: Option<FinalReport>,
}

impl ScreeningRecord {
    pub fn decision_rationale(&self) -> String {
        match &self.report {
            Some(report) => match report.decision() {
                Some(outcome) => outcome.summary(),
                None => format!(
                    "screening {} without a decision",
                    report.status.label()
                ),
            },
            None => "pending screening".to_string(),
        }
    }

    pub fn status_view(&self) -> ScreeningStatusView {
        ScreeningStatusView {
            application_id: self.application_id.clone(),
            status: self.status.label(),
            decision_rationale: self.decision_rationale(),
            screening_id: self.report.as_ref().map(|report| report.screening_id.clone()),
            risk_score: self
                .report
                .as_ref()
                .and_then(FinalReport::decision)
                .and_then(|outcome| outcome.risk_score),
            failed_stages: self
                .report
                .as_ref()
                .map(|report| report.failed_stages.clone())
                .unwrap_or_default(),
        }
    }
}

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ScreeningRepository: Send + Sync {
    fn insert(&self, record: ScreeningRecord) -> Result<ScreeningRecord, RepositoryError>;
    fn update(&self, record: ScreeningRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ScreeningRecord>, RepositoryError>;
    /// Atomically move a screenable record (see
    /// [`ApplicationStatus::is_screenable`]) to Processing and return it.
    /// Fails with [`RepositoryError::NotClaimable`] when the record is in any
    /// other status.
    fn claim(&self, id: &ApplicationId) -> Result<ScreeningRecord, RepositoryError>;
    /// Records awaiting screening, oldest first.
    fn pending(&self, limit: usize) -> Result<Vec<ScreeningRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is {} and cannot be claimed", .0.label())]
    NotClaimable(ApplicationStatus),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub decision_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screening_id: Option<ScreeningId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_stages: Vec<String>,
}
