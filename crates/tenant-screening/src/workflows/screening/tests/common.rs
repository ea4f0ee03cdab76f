use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::domain::{
    AdditionalInfo, Address, ApplicantDetails, ApplicationId, EmploymentDetails,
    EmploymentStatus, RentalHistory, ScreeningSubmission,
};
use crate::workflows::screening::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::repository::{
    ApplicationStatus, RepositoryError, ScreeningRecord, ScreeningRepository,
};
use crate::workflows::screening::service::ScreeningService;
use crate::workflows::screening::stage::{Stage, StageDefinition, StageError};
use crate::workflows::screening::stages::credit::{
    CreditBureau, CreditBureauError, CreditInquiry, CreditReport, PublicRecords,
    SyntheticCreditBureau,
};
use crate::workflows::screening::stages::standard_orchestrator;

pub(super) const STRONG_SSN: &str = "123-45-6789";
pub(super) const CONDITIONAL_SSN: &str = "345-67-8901";
pub(super) const DENIED_SSN: &str = "234-56-7890";

pub(super) fn submission() -> ScreeningSubmission {
    ScreeningSubmission {
        applicant: ApplicantDetails {
            first_name: "Jordan".to_string(),
            last_name: "Rivera".to_string(),
            email: "jordan.rivera@example.com".to_string(),
            phone: "515-555-0142".to_string(),
            ssn: STRONG_SSN.to_string(),
            date_of_birth: "1988-04-12".to_string(),
            current_address: Address {
                street: "410 Grand Ave".to_string(),
                city: "Des Moines".to_string(),
                state: "IA".to_string(),
                zip: "50309".to_string(),
            },
        },
        employment: EmploymentDetails {
            employer_name: "Principal Financial".to_string(),
            job_title: "Software Engineer".to_string(),
            employment_status: EmploymentStatus::FullTime,
            annual_income: 120_000,
            years_employed: 4.0,
            employer_phone: "515-555-0100".to_string(),
        },
        rental_history: Some(RentalHistory {
            current_landlord: Some("Riverfront Lofts".to_string()),
            current_landlord_phone: Some("515-555-0199".to_string()),
            monthly_rent: Some(1400),
            years_at_current: Some(3.0),
            reason_for_leaving: Some("Relocating closer to work".to_string()),
        }),
        additional_info: AdditionalInfo::default(),
        desired_monthly_rent: Some(1800),
    }
}

pub(super) fn submission_with_ssn(ssn: &str) -> ScreeningSubmission {
    let mut submission = submission();
    submission.applicant.ssn = ssn.to_string();
    submission
}

pub(super) fn credit_report(score: u16) -> CreditReport {
    CreditReport {
        bureau: SyntheticCreditBureau::NAME.to_string(),
        credit_score: score,
        total_accounts: 9,
        recent_accounts: 1,
        history_years: 12,
        hard_inquiries: 1,
        delinquent_accounts: 0,
        utilization: 0.18,
        public_records: PublicRecords::default(),
    }
}

/// Synthetic bureau with pinned files for the approve, conditional, and deny
/// fixtures.
pub(super) fn bureau() -> Arc<dyn CreditBureau> {
    Arc::new(
        SyntheticCreditBureau::default()
            .with_report(STRONG_SSN, credit_report(780))
            .with_report(CONDITIONAL_SSN, credit_report(620))
            .with_report(DENIED_SSN, credit_report(540)),
    )
}

pub(super) struct UnavailableBureau;

#[async_trait]
impl CreditBureau for UnavailableBureau {
    async fn pull_report(&self, _inquiry: &CreditInquiry) -> Result<CreditReport, CreditBureauError> {
        Err(CreditBureauError::Unavailable("connection refused".to_string()))
    }
}

pub(super) fn orchestrator() -> Arc<Orchestrator> {
    Arc::new(
        standard_orchestrator(bureau(), OrchestratorConfig::default())
            .expect("standard pipeline builds"),
    )
}

pub(super) fn build_service() -> (ScreeningService<MemoryRepository>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = ScreeningService::new(orchestrator(), repository.clone());
    (service, repository)
}

/// Service over a single stage that sleeps for `delay` before answering.
pub(super) fn sleepy_service(
    delay: Duration,
) -> (ScreeningService<MemoryRepository>, Arc<MemoryRepository>) {
    let orchestrator = Orchestrator::new(
        vec![StageDefinition::new("slow", &[], SleepyStage("slow", delay))],
        OrchestratorConfig::default(),
    )
    .expect("orchestrator builds");
    let repository = Arc::new(MemoryRepository::default());
    let service = ScreeningService::new(Arc::new(orchestrator), repository.clone());
    (service, repository)
}

/// Records the dependency results it was handed.
pub(super) struct EchoStage(pub(super) &'static str);

#[async_trait]
impl Stage for EchoStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let seen: Vec<Value> = input
            .dependencies()
            .map(|result| json!({ "stage": result.stage, "status": result.status().label() }))
            .collect();
        Ok(StagePayload::Custom(json!({ "stage": self.0, "seen": seen })))
    }
}

pub(super) struct FailingStage;

#[async_trait]
impl Stage for FailingStage {
    async fn execute(&self, _input: &StageInput) -> Result<StagePayload, StageError> {
        Err(StageError::Failed("upstream service returned 503".to_string()))
    }
}

pub(super) struct PanickingStage;

#[async_trait]
impl Stage for PanickingStage {
    async fn execute(&self, _input: &StageInput) -> Result<StagePayload, StageError> {
        panic!("stage exploded");
    }
}

/// Sleeps before answering, to exercise timeouts and completion ordering.
pub(super) struct SleepyStage(pub(super) &'static str, pub(super) Duration);

#[async_trait]
impl Stage for SleepyStage {
    async fn execute(&self, _input: &StageInput) -> Result<StagePayload, StageError> {
        tokio::time::sleep(self.1).await;
        Ok(StagePayload::Custom(json!({ "stage": self.0 })))
    }
}

/// Blocks until the shared [`Notify`] is signalled.
pub(super) struct GatedStage(pub(super) Arc<Notify>);

#[async_trait]
impl Stage for GatedStage {
    async fn execute(&self, _input: &StageInput) -> Result<StagePayload, StageError> {
        self.0.notified().await;
        Ok(StagePayload::Custom(json!({ "stage": "gated" })))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ScreeningRecord>>>,
}

impl ScreeningRepository for MemoryRepository {
    fn insert(&self, record: ScreeningRecord) -> Result<ScreeningRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ScreeningRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(record.application_id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ScreeningRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn claim(&self, id: &ApplicationId) -> Result<ScreeningRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !record.status.is_screenable() {
            return Err(RepositoryError::NotClaimable(record.status));
        }
        record.status = ApplicationStatus::Processing;
        Ok(record.clone())
    }

    fn pending(&self, limit: usize) -> Result<Vec<ScreeningRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut pending: Vec<ScreeningRecord> = guard
            .values()
            .filter(|record| record.status == ApplicationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.application_id.cmp(&b.application_id))
        });
        pending.truncate(limit);
        Ok(pending)
    }
}

pub(super) struct UnavailableRepository;

impl ScreeningRepository for UnavailableRepository {
    fn insert(&self, _record: ScreeningRecord) -> Result<ScreeningRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: ScreeningRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ScreeningRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn claim(&self, _id: &ApplicationId) -> Result<ScreeningRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn pending(&self, _limit: usize) -> Result<Vec<ScreeningRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}
