use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{ApplicationId, ScreeningId, ScreeningSubmission, SubmissionError};
use super::orchestrator::{Orchestrator, OrchestratorError};
use super::report::FinalReport;
use super::repository::{ApplicationStatus, RepositoryError, ScreeningRecord, ScreeningRepository};

/// Service composing intake validation, the repository, and the orchestrator.
pub struct ScreeningService<R> {
    orchestrator: Arc<Orchestrator>,
    repository: Arc<R>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<R> ScreeningService<R>
where
    R: ScreeningRepository + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator>, repository: Arc<R>) -> Self {
        Self {
            orchestrator,
            repository,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Validate and store a new application as pending.
    pub fn submit(
        &self,
        submission: ScreeningSubmission,
    ) -> Result<ScreeningRecord, ScreeningServiceError> {
        submission.validate()?;

        let record = ScreeningRecord {
            application_id: next_application_id(),
            submission,
            status: ApplicationStatus::Pending,
            submitted_at: Utc::now(),
            report: None,
        };

        let stored = self.repository.insert(record)?;
        info!(application_id = %stored.application_id, "application submitted");
        Ok(stored)
    }

    /// Run a full screening for a pending (or previously failed) application
    /// and persist the report with the mapped status. The screening runs as
    /// a tracked orchestrator task so shutdown can cancel it; a cancelled or
    /// aborted screening leaves the application Failed and retryable. The
    /// screening context is released either way.
    pub async fn screen(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ScreeningRecord, ScreeningServiceError> {
        let mut record = match self.repository.claim(application_id) {
            Ok(record) => record,
            Err(RepositoryError::NotClaimable(status)) => {
                return Err(ScreeningServiceError::NotScreenable {
                    application_id: application_id.clone(),
                    status,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let report = match self.run_tracked(record.submission.clone()).await {
            Ok(report) => report,
            Err(err) => {
                warn!(application_id = %application_id, error = %err, "screening aborted");
                record.status = ApplicationStatus::Failed;
                self.repository.update(record)?;
                return Err(err.into());
            }
        };

        record.status = ApplicationStatus::from_report(&report);
        info!(
            application_id = %application_id,
            screening_id = %report.screening_id,
            status = record.status.label(),
            processing_time_ms = report.processing_time_ms,
            "application screened"
        );
        record.report = Some(report);
        self.repository.update(record.clone())?;

        Ok(record)
    }

    /// Fetch an application and current status for API responses.
    pub fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ScreeningRecord, ScreeningServiceError> {
        let record = self
            .repository
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    async fn run_tracked(&self, submission: ScreeningSubmission) -> Result<FinalReport, OrchestratorError> {
        let screening_id = self.orchestrator.start(submission)?;
        let outcome = self.orchestrator.wait(&screening_id).await;
        self.discard(&screening_id);
        outcome
    }

    fn discard(&self, screening_id: &ScreeningId) {
        match self.orchestrator.evict(screening_id) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(screening_id = %screening_id, error = %err, "unable to evict screening context");
            }
        }
    }

    pub fn pending(&self, limit: usize) -> Result<Vec<ScreeningRecord>, ScreeningServiceError> {
        Ok(self.repository.pending(limit)?)
    }
}

/// Error raised by the screening service.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningServiceError {
    #[error(transparent)]
    Validation(#[from] SubmissionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("application {application_id} is {} and cannot be screened", .status.label())]
    NotScreenable {
        application_id: ApplicationId,
        status: ApplicationStatus,
    },
}
