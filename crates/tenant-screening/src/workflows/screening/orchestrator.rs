use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ScreeningConfig;

use super::context::{ContextError, ContextStore};
use super::domain::{ScreeningId, ScreeningStatus, ScreeningSubmission};
use super::plan::{ExecutionPlan, GraphError, StageGraph};
use super::report::{FinalReport, ScreeningProgress};
use super::stage::{StageDefinition, StageFailure, StageResult, StageStatus};

const DEADLINE_ELAPSED: &str = "screening deadline elapsed before the stage started";
const HALTED_AFTER_FAILURE: &str = "skipped after an earlier wave failed under the fail-fast policy";
const CANCELLED: &str = "screening cancelled before the stage finished";
const ABANDONED: &str = "screening stopped after an internal error";

/// How a stage failure affects later waves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Later waves run; dependents see the failed result and degrade.
    #[default]
    BestEffort,
    /// Later waves are skipped once any stage in a wave fails.
    FailFast,
}

impl FailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Some(Self::BestEffort),
            "fail_fast" => Some(Self::FailFast),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            FailurePolicy::BestEffort => "best_effort",
            FailurePolicy::FailFast => "fail_fast",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub stage_timeout: Duration,
    pub screening_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    /// Stage whose payload becomes the report's final decision.
    pub terminal_stage: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&ScreeningConfig::default())
    }
}

impl From<&ScreeningConfig> for OrchestratorConfig {
    fn from(config: &ScreeningConfig) -> Self {
        Self {
            stage_timeout: config.stage_timeout,
            screening_timeout: config.screening_timeout,
            failure_policy: config.failure_policy,
            terminal_stage: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_terminal_stage(mut self, stage: impl Into<String>) -> Self {
        self.terminal_stage = Some(stage.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("terminal stage `{0}` is not registered")]
    UnknownTerminalStage(String),
    #[error("screening `{0}` has not finished")]
    NotFinished(ScreeningId),
    #[error("screening task for `{screening_id}` ended abnormally: {reason}")]
    TaskAborted {
        screening_id: ScreeningId,
        reason: String,
    },
}

impl OrchestratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Context(ContextError::ScreeningNotFound(_))
        )
    }
}

/// A spawned screening. The join handle is taken by [`Orchestrator::wait`];
/// the abort handle stays registered until the waiter has collected the
/// outcome so [`Orchestrator::shutdown`] can still cancel it.
struct ScreeningTask {
    handle: Option<JoinHandle<Result<FinalReport, OrchestratorError>>>,
    abort: AbortHandle,
}

/// Runs screenings wave by wave over a fixed set of stages.
///
/// Stages within a wave run concurrently and a wave starts only after every
/// stage of the previous wave has recorded a result. Each stage is bounded by
/// the stage timeout and, when configured, by the screening deadline.
pub struct Orchestrator {
    graph: StageGraph,
    plan: ExecutionPlan,
    waves: Vec<Vec<StageDefinition>>,
    store: Arc<ContextStore>,
    config: OrchestratorConfig,
    active: Mutex<HashMap<ScreeningId, ScreeningTask>>,
}

impl Orchestrator {
    pub fn new(
        definitions: Vec<StageDefinition>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        Self::with_store(definitions, config, Arc::new(ContextStore::new()))
    }

    pub fn with_store(
        definitions: Vec<StageDefinition>,
        config: OrchestratorConfig,
        store: Arc<ContextStore>,
    ) -> Result<Self, OrchestratorError> {
        let mut graph = StageGraph::new();
        for definition in &definitions {
            graph.register(definition.name(), definition.dependencies().iter().cloned())?;
        }
        let plan = graph.build_plan()?;

        if let Some(terminal) = &config.terminal_stage {
            if !graph.contains(terminal) {
                return Err(OrchestratorError::UnknownTerminalStage(terminal.clone()));
            }
        }

        let mut by_name: HashMap<String, StageDefinition> = definitions
            .into_iter()
            .map(|definition| (definition.name().to_string(), definition))
            .collect();
        let waves = plan
            .waves()
            .iter()
            .map(|wave| wave.iter().filter_map(|name| by_name.remove(name)).collect())
            .collect();

        debug!(
            waves = plan.len(),
            stages = plan.stage_count(),
            policy = config.failure_policy.label(),
            "orchestrator plan built"
        );

        Ok(Self {
            graph,
            plan,
            waves,
            store,
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Create a context and drive the screening to completion on the
    /// current task.
    pub async fn run(&self, submission: ScreeningSubmission) -> Result<FinalReport, OrchestratorError> {
        let id = self.begin(submission)?;
        self.drive(&id).await
    }

    /// Create a context and drive the screening on a spawned task. The
    /// returned id can be polled with [`Orchestrator::status`] and collected
    /// with [`Orchestrator::wait`].
    pub fn start(self: &Arc<Self>, submission: ScreeningSubmission) -> Result<ScreeningId, OrchestratorError> {
        let id = self.begin(submission)?;
        let this = Arc::clone(self);
        let task_id = id.clone();
        let handle = tokio::spawn(async move { this.drive(&task_id).await });
        let abort = handle.abort_handle();
        self.active_tasks().insert(
            id.clone(),
            ScreeningTask {
                handle: Some(handle),
                abort,
            },
        );
        Ok(id)
    }

    /// Await a spawned screening, or assemble the report of one that is no
    /// longer tracked. A screening cancelled by [`Orchestrator::shutdown`]
    /// resolves to [`OrchestratorError::TaskAborted`].
    pub async fn wait(&self, id: &ScreeningId) -> Result<FinalReport, OrchestratorError> {
        let handle = self
            .active_tasks()
            .get_mut(id)
            .and_then(|task| task.handle.take());
        let Some(handle) = handle else {
            return self.assemble(id);
        };

        let joined = handle.await;
        self.active_tasks().remove(id);
        joined.map_err(|err| OrchestratorError::TaskAborted {
            screening_id: id.clone(),
            reason: err.to_string(),
        })?
    }

    pub fn status(&self, id: &ScreeningId) -> Result<ScreeningProgress, OrchestratorError> {
        let snapshot = self.store.snapshot(id)?;
        Ok(ScreeningProgress {
            screening_id: id.clone(),
            status: snapshot.status,
            stages_completed: snapshot.stages_completed,
            stages_total: self.plan.stage_count(),
            created_at: snapshot.created_at,
        })
    }

    /// Build the report of a finished screening. Results are ordered by the
    /// plan regardless of completion order.
    pub fn assemble(&self, id: &ScreeningId) -> Result<FinalReport, OrchestratorError> {
        let context = self.store.context(id)?;
        if !context.status().is_terminal() {
            return Err(OrchestratorError::NotFinished(id.clone()));
        }

        let stage_results: Vec<StageResult> = self
            .plan
            .stages()
            .filter_map(|name| context.result(name).cloned())
            .collect();

        let final_decision = self
            .config
            .terminal_stage
            .as_deref()
            .and_then(|terminal| stage_results.iter().find(|result| result.stage == terminal))
            .and_then(|result| result.payload().cloned());

        let failed_stages = stage_results
            .iter()
            .filter(|result| !result.is_success())
            .map(|result| result.stage.clone())
            .collect();

        let completed_at = context.completed_at();
        let processing_time_ms = completed_at
            .map(|done| (done - context.created_at()).num_milliseconds().max(0) as u64)
            .unwrap_or_default();

        Ok(FinalReport {
            screening_id: id.clone(),
            status: context.status(),
            stage_results,
            final_decision,
            failed_stages,
            created_at: context.created_at(),
            completed_at,
            processing_time_ms,
        })
    }

    /// Assemble the report and drop the context.
    pub fn release(&self, id: &ScreeningId) -> Result<FinalReport, OrchestratorError> {
        let report = self.assemble(id)?;
        self.evict(id)?;
        Ok(report)
    }

    pub fn evict(&self, id: &ScreeningId) -> Result<(), OrchestratorError> {
        self.store.remove(id)?;
        self.active_tasks().remove(id);
        debug!(screening_id = %id, "screening context evicted");
        Ok(())
    }

    pub fn active_screenings(&self) -> Vec<ScreeningId> {
        self.active_tasks()
            .iter()
            .filter(|(_, task)| !task.abort.is_finished())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Abort every in-flight spawned screening and mark it failed. Returns the
    /// number of screenings cancelled.
    pub fn shutdown(&self) -> usize {
        let tasks: Vec<(ScreeningId, ScreeningTask)> = self.active_tasks().drain().collect();
        let mut cancelled = 0;
        for (id, task) in tasks {
            if task.abort.is_finished() {
                continue;
            }
            task.abort.abort();
            cancelled += 1;
            if let Err(err) = self.fail_unfinished(&id, CANCELLED) {
                warn!(screening_id = %id, error = %err, "unable to mark cancelled screening failed");
            }
        }
        if cancelled > 0 {
            info!(cancelled, "cancelled in-flight screenings");
        }
        cancelled
    }

    fn begin(&self, submission: ScreeningSubmission) -> Result<ScreeningId, OrchestratorError> {
        let id = ScreeningId::generate();
        self.store.create(id.clone(), submission)?;
        Ok(id)
    }

    fn active_tasks(&self) -> MutexGuard<'_, HashMap<ScreeningId, ScreeningTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute the plan; a screening that stops on an internal error is
    /// moved to Failed so it never lingers as Running.
    async fn drive(&self, id: &ScreeningId) -> Result<FinalReport, OrchestratorError> {
        let outcome = self.execute(id).await;
        if let Err(err) = &outcome {
            error!(screening_id = %id, error = %err, "screening stopped");
            if let Err(cleanup) = self.fail_unfinished(id, ABANDONED) {
                warn!(screening_id = %id, error = %cleanup, "unable to mark stopped screening failed");
            }
        }
        outcome
    }

    async fn execute(&self, id: &ScreeningId) -> Result<FinalReport, OrchestratorError> {
        let started = Instant::now();
        let deadline = self.config.screening_timeout.map(|limit| started + limit);
        let past_deadline = || deadline.is_some_and(|deadline| Instant::now() >= deadline);

        self.store.transition(id, ScreeningStatus::Running)?;
        info!(
            screening_id = %id,
            waves = self.plan.len(),
            stages = self.plan.stage_count(),
            "screening started"
        );

        let mut halted: Option<&'static str> = None;
        for (wave_index, wave) in self.waves.iter().enumerate() {
            if halted.is_none() && past_deadline() {
                halted = Some(DEADLINE_ELAPSED);
            }
            if let Some(reason) = halted {
                self.skip(id, wave, reason)?;
                continue;
            }

            debug!(screening_id = %id, wave = wave_index, stages = wave.len(), "dispatching wave");
            let mut running: FuturesUnordered<_> = wave
                .iter()
                .map(|definition| self.run_stage(id, definition, deadline))
                .collect();

            let mut wave_failed = false;
            while let Some(status) = running.next().await {
                if status? == StageStatus::Error {
                    wave_failed = true;
                }
            }

            if wave_failed && self.config.failure_policy == FailurePolicy::FailFast {
                halted = Some(HALTED_AFTER_FAILURE);
            } else if past_deadline() {
                halted = Some(DEADLINE_ELAPSED);
            }
        }

        let status = if halted.is_some() {
            ScreeningStatus::Failed
        } else {
            ScreeningStatus::Completed
        };
        self.store.transition(id, status)?;
        let report = self.assemble(id)?;

        match halted {
            Some(reason) => warn!(
                screening_id = %id,
                failed_stages = report.failed_stages.len(),
                reason,
                "screening halted"
            ),
            None => info!(
                screening_id = %id,
                failed_stages = report.failed_stages.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "screening completed"
            ),
        }

        Ok(report)
    }

    async fn run_stage(
        &self,
        id: &ScreeningId,
        definition: &StageDefinition,
        deadline: Option<Instant>,
    ) -> Result<StageStatus, ContextError> {
        let input = self.store.build_stage_input(id, definition.dependencies())?;
        let budget = match deadline {
            Some(deadline) => self
                .config
                .stage_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.config.stage_timeout,
        };

        let stage = definition.stage();
        let name = definition.name();
        let started = Instant::now();
        let execution = AssertUnwindSafe(stage.execute(&input)).catch_unwind();

        let result = match timeout(budget, execution).await {
            Ok(Ok(Ok(payload))) => StageResult::success(name, payload, started.elapsed()),
            Ok(Ok(Err(err))) => {
                warn!(screening_id = %id, stage = %name, error = %err, "stage failed");
                StageResult::failure(name, StageFailure::failed(&err), started.elapsed())
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(screening_id = %id, stage = %name, %message, "stage panicked");
                StageResult::failure(
                    name,
                    StageFailure::panicked(format!("stage panicked: {message}")),
                    started.elapsed(),
                )
            }
            Err(_) => {
                warn!(
                    screening_id = %id,
                    stage = %name,
                    budget_ms = budget.as_millis() as u64,
                    "stage timed out"
                );
                StageResult::failure(name, StageFailure::timed_out(budget), started.elapsed())
            }
        };

        let status = result.status();
        debug!(
            screening_id = %id,
            stage = %name,
            status = status.label(),
            duration_ms = result.duration_ms,
            "stage finished"
        );
        self.store.write_result(id, result)?;
        Ok(status)
    }

    fn skip(&self, id: &ScreeningId, wave: &[StageDefinition], reason: &str) -> Result<(), ContextError> {
        for definition in wave {
            debug!(screening_id = %id, stage = %definition.name(), reason, "stage skipped");
            self.store.write_result(
                id,
                StageResult::failure(definition.name(), StageFailure::skipped(reason), Duration::ZERO),
            )?;
        }
        Ok(())
    }

    fn fail_unfinished(&self, id: &ScreeningId, reason: &str) -> Result<(), ContextError> {
        for name in self.plan.stages() {
            if self.store.get(id, name)?.is_some() {
                continue;
            }
            let skipped = StageResult::failure(name, StageFailure::skipped(reason), Duration::ZERO);
            match self.store.write_result(id, skipped) {
                Ok(()) | Err(ContextError::DuplicateWrite { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        match self.store.transition(id, ScreeningStatus::Failed) {
            Ok(()) | Err(ContextError::InvalidTransition { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
