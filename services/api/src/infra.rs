use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tenant_screening::workflows::screening::{
    ApplicationId, ApplicationStatus, Orchestrator, RepositoryError, ScreeningRecord,
    ScreeningRepository,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) orchestrator: Arc<Orchestrator>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryScreeningRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ScreeningRecord>>>,
}

impl InMemoryScreeningRepository {
    fn records(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ApplicationId, ScreeningRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    pub(crate) fn all(&self) -> Result<Vec<ScreeningRecord>, RepositoryError> {
        let mut records: Vec<ScreeningRecord> = self.records()?.values().cloned().collect();
        records.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        Ok(records)
    }
}

impl ScreeningRepository for InMemoryScreeningRepository {
    fn insert(&self, record: ScreeningRecord) -> Result<ScreeningRecord, RepositoryError> {
        let mut guard = self.records()?;
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ScreeningRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records()?;
        if guard.contains_key(&record.application_id) {
            guard.insert(record.application_id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ScreeningRecord>, RepositoryError> {
        Ok(self.records()?.get(id).cloned())
    }

    fn claim(&self, id: &ApplicationId) -> Result<ScreeningRecord, RepositoryError> {
        let mut guard = self.records()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !record.status.is_screenable() {
            return Err(RepositoryError::NotClaimable(record.status));
        }
        record.status = ApplicationStatus::Processing;
        Ok(record.clone())
    }

    fn pending(&self, limit: usize) -> Result<Vec<ScreeningRecord>, RepositoryError> {
        let mut pending: Vec<ScreeningRecord> = self
            .records()?
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
