use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::domain::{ScreeningId, ScreeningStatus, ScreeningSubmission};
use super::payload::StagePayload;
use super::stage::StageResult;

/// Per-screening state: the immutable submission, every stage result written
/// so far (in completion order), and lifecycle metadata.
#[derive(Debug, Clone)]
pub struct ScreeningContext {
    id: ScreeningId,
    submission: Arc<ScreeningSubmission>,
    results: Vec<StageResult>,
    status: ScreeningStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ScreeningContext {
    fn new(id: ScreeningId, submission: ScreeningSubmission) -> Self {
        Self {
            id,
            submission: Arc::new(submission),
            results: Vec::new(),
            status: ScreeningStatus::Created,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> &ScreeningId {
        &self.id
    }

    pub fn submission(&self) -> &ScreeningSubmission {
        &self.submission
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|result| result.stage == stage)
    }

    pub fn status(&self) -> ScreeningStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

/// Lightweight view of a context used for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub status: ScreeningStatus,
    pub stages_completed: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a stage sees when it runs: the original submission and the results of
/// its declared dependencies, keyed by stage name. Failed dependencies are
/// included as error results so the stage can decide how to degrade.
#[derive(Debug, Clone)]
pub struct StageInput {
    screening_id: ScreeningId,
    submission: Arc<ScreeningSubmission>,
    dependencies: BTreeMap<String, StageResult>,
}

impl StageInput {
    pub fn new(
        screening_id: ScreeningId,
        submission: Arc<ScreeningSubmission>,
        dependencies: BTreeMap<String, StageResult>,
    ) -> Self {
        Self {
            screening_id,
            submission,
            dependencies,
        }
    }

    pub fn screening_id(&self) -> &ScreeningId {
        &self.screening_id
    }

    pub fn submission(&self) -> &ScreeningSubmission {
        &self.submission
    }

    pub fn dependency(&self, stage: &str) -> Option<&StageResult> {
        self.dependencies.get(stage)
    }

    /// Payload of a dependency that succeeded; `None` when it failed or was
    /// not declared.
    pub fn payload(&self, stage: &str) -> Option<&StagePayload> {
        self.dependencies.get(stage).and_then(StageResult::payload)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &StageResult> {
        self.dependencies.values()
    }

    pub fn failed_dependencies(&self) -> Vec<&str> {
        self.dependencies
            .values()
            .filter(|result| !result.is_success())
            .map(|result| result.stage.as_str())
            .collect()
    }
}

/// Concurrent store of screening contexts.
///
/// The outer map lock is held only long enough to look up or insert an entry;
/// each context carries its own mutex so stages of different screenings never
/// contend.
#[derive(Debug, Default)]
pub struct ContextStore {
    contexts: RwLock<HashMap<ScreeningId, Arc<Mutex<ScreeningContext>>>>,
}

fn lock(context: &Mutex<ScreeningContext>) -> MutexGuard<'_, ScreeningContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: ScreeningId, submission: ScreeningSubmission) -> Result<(), ContextError> {
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        if contexts.contains_key(&id) {
            return Err(ContextError::DuplicateContext(id));
        }
        let context = ScreeningContext::new(id.clone(), submission);
        contexts.insert(id, Arc::new(Mutex::new(context)));
        Ok(())
    }

    fn entry(&self, id: &ScreeningId) -> Result<Arc<Mutex<ScreeningContext>>, ContextError> {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts
            .get(id)
            .cloned()
            .ok_or_else(|| ContextError::ScreeningNotFound(id.clone()))
    }

    /// Collect the submission and whatever results exist for `dependencies`.
    /// Dependencies without a recorded result are omitted.
    pub fn build_stage_input(
        &self,
        id: &ScreeningId,
        dependencies: &[String],
    ) -> Result<StageInput, ContextError> {
        let entry = self.entry(id)?;
        let context = lock(&entry);

        let results = dependencies
            .iter()
            .filter_map(|name| {
                context
                    .result(name)
                    .map(|result| (name.clone(), result.clone()))
            })
            .collect();

        Ok(StageInput::new(
            context.id.clone(),
            Arc::clone(&context.submission),
            results,
        ))
    }

    pub fn write_result(&self, id: &ScreeningId, result: StageResult) -> Result<(), ContextError> {
        let entry = self.entry(id)?;
        let mut context = lock(&entry);
        if context.result(&result.stage).is_some() {
            return Err(ContextError::DuplicateWrite {
                screening_id: id.clone(),
                stage: result.stage,
            });
        }
        context.results.push(result);
        Ok(())
    }

    pub fn get(&self, id: &ScreeningId, stage: &str) -> Result<Option<StageResult>, ContextError> {
        let entry = self.entry(id)?;
        let context = lock(&entry);
        Ok(context.result(stage).cloned())
    }

    /// Results in completion order.
    pub fn get_all(&self, id: &ScreeningId) -> Result<Vec<StageResult>, ContextError> {
        let entry = self.entry(id)?;
        let context = lock(&entry);
        Ok(context.results.clone())
    }

    pub fn context(&self, id: &ScreeningId) -> Result<ScreeningContext, ContextError> {
        let entry = self.entry(id)?;
        let context = lock(&entry);
        Ok(context.clone())
    }

    pub fn snapshot(&self, id: &ScreeningId) -> Result<ContextSnapshot, ContextError> {
        let entry = self.entry(id)?;
        let context = lock(&entry);
        Ok(ContextSnapshot {
            status: context.status,
            stages_completed: context.results.len(),
            created_at: context.created_at,
            completed_at: context.completed_at,
        })
    }

    pub fn transition(&self, id: &ScreeningId, next: ScreeningStatus) -> Result<(), ContextError> {
        let entry = self.entry(id)?;
        let mut context = lock(&entry);
        if !context.status.can_transition_to(next) {
            return Err(ContextError::InvalidTransition {
                screening_id: id.clone(),
                from: context.status,
                to: next,
            });
        }
        context.status = next;
        if next.is_terminal() {
            context.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Drop a context, returning its final state.
    pub fn remove(&self, id: &ScreeningId) -> Result<ScreeningContext, ContextError> {
        let entry = {
            let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
            contexts
                .remove(id)
                .ok_or_else(|| ContextError::ScreeningNotFound(id.clone()))?
        };
        let context = lock(&entry).clone();
        Ok(context)
    }

    pub fn contains(&self, id: &ScreeningId) -> bool {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("screening context `{0}` already exists")]
    DuplicateContext(ScreeningId),
    #[error("stage `{stage}` already recorded a result for screening `{screening_id}`")]
    DuplicateWrite {
        screening_id: ScreeningId,
        stage: String,
    },
    #[error("screening `{0}` not found")]
    ScreeningNotFound(ScreeningId),
    #[error("screening `{screening_id}` cannot move from {from} to {to}")]
    InvalidTransition {
        screening_id: ScreeningId,
        from: ScreeningStatus,
        to: ScreeningStatus,
    },
}
