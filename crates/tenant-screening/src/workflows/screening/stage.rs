use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::StageInput;
use super::payload::StagePayload;

/// A single unit of screening work.
///
/// Implementations receive the initial submission plus the results of every
/// declared dependency, and either produce a typed payload or fail. Failures
/// are recorded as error results; they never abort the orchestrator.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError>;
}

/// Failure raised by a stage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("required dependency `{0}` did not produce a usable result")]
    MissingDependency(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// Name, dependencies, and implementation of a registered stage.
#[derive(Clone)]
pub struct StageDefinition {
    name: String,
    dependencies: Vec<String>,
    stage: Arc<dyn Stage>,
}

impl StageDefinition {
    pub fn new<S>(name: impl Into<String>, dependencies: &[&str], stage: S) -> Self
    where
        S: Stage + 'static,
    {
        Self::from_arc(
            name,
            dependencies.iter().map(|dep| dep.to_string()).collect(),
            Arc::new(stage),
        )
    }

    pub fn from_arc(name: impl Into<String>, dependencies: Vec<String>, stage: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            stage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn stage(&self) -> Arc<dyn Stage> {
        Arc::clone(&self.stage)
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Error,
}

impl StageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Error => "error",
        }
    }
}

/// Why a stage ended without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage returned an error.
    Failed,
    /// The stage panicked while executing.
    Panicked,
    /// The stage exceeded its time budget.
    TimedOut,
    /// The stage never ran.
    Skipped,
}

impl FailureKind {
    pub const fn label(self) -> &'static str {
        match self {
            FailureKind::Failed => "failed",
            FailureKind::Panicked => "panicked",
            FailureKind::TimedOut => "timed out",
            FailureKind::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn failed(error: &StageError) -> Self {
        Self {
            kind: FailureKind::Failed,
            message: error.to_string(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panicked,
            message: message.into(),
        }
    }

    pub fn timed_out(budget: Duration) -> Self {
        Self {
            kind: FailureKind::TimedOut,
            message: format!("stage exceeded its {}ms time budget", budget.as_millis()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Skipped,
            message: reason.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Success { payload: StagePayload },
    Error { error: StageFailure },
}

/// Recorded outcome of one stage within one screening. Written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    pub fn success(stage: impl Into<String>, payload: StagePayload, duration: Duration) -> Self {
        Self::new(stage, StageOutcome::Success { payload }, duration)
    }

    pub fn failure(stage: impl Into<String>, error: StageFailure, duration: Duration) -> Self {
        Self::new(stage, StageOutcome::Error { error }, duration)
    }

    fn new(stage: impl Into<String>, outcome: StageOutcome, duration: Duration) -> Self {
        Self {
            stage: stage.into(),
            outcome,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            completed_at: Utc::now(),
        }
    }

    pub fn status(&self) -> StageStatus {
        match self.outcome {
            StageOutcome::Success { .. } => StageStatus::Success,
            StageOutcome::Error { .. } => StageStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == StageStatus::Success
    }

    pub fn payload(&self) -> Option<&StagePayload> {
        match &self.outcome {
            StageOutcome::Success { payload } => Some(payload),
            StageOutcome::Error { .. } => None,
        }
    }

    pub fn failure_detail(&self) -> Option<&StageFailure> {
        match &self.outcome {
            StageOutcome::Success { .. } => None,
            StageOutcome::Error { error } => Some(error),
        }
    }
}
