//! Tenant screening orchestration.
//!
//! Stages are registered with their dependencies in a [`StageGraph`], grouped
//! into an [`ExecutionPlan`] of waves, and executed by the [`Orchestrator`]
//! against a per-screening [`ContextStore`]. The standard pipeline lives in
//! [`stages`]; [`ScreeningService`] and [`screening_router`] expose it to the
//! API layer and [`ScreeningProcessor`] drains pending applications in the
//! background.

pub mod context;
pub mod domain;
pub mod orchestrator;
pub mod payload;
pub mod plan;
pub mod processor;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod stage;
pub mod stages;

#[cfg(test)]
mod tests;

pub use context::{ContextError, ContextSnapshot, ContextStore, ScreeningContext, StageInput};
pub use domain::{
    AdditionalInfo, Address, ApplicantDetails, ApplicationId, EmploymentDetails,
    EmploymentStatus, RentalHistory, ScreeningId, ScreeningStatus, ScreeningSubmission,
    SubmissionError,
};
pub use orchestrator::{FailurePolicy, Orchestrator, OrchestratorConfig, OrchestratorError};
pub use payload::StagePayload;
pub use plan::{ExecutionPlan, GraphError, StageGraph};
pub use processor::{BatchSummary, ProcessorConfig, ProcessorStats, ScreeningProcessor};
pub use report::{FinalReport, ScreeningProgress};
pub use repository::{
    ApplicationStatus, RepositoryError, ScreeningRecord, ScreeningRepository, ScreeningStatusView,
};
pub use router::screening_router;
pub use service::{ScreeningService, ScreeningServiceError};
pub use stage::{
    FailureKind, Stage, StageDefinition, StageError, StageFailure, StageOutcome, StageResult,
    StageStatus,
};
pub use stages::credit::{CreditBureau, SyntheticCreditBureau};
pub use stages::decision::{DecisionOutcome, ScreeningDecision};
pub use stages::{standard_orchestrator, standard_pipeline};
