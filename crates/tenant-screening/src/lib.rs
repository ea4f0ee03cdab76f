//! Tenant screening orchestration core.
//!
//! Screening stages are registered with their dependencies, scheduled into
//! parallel waves, and executed against a per-screening context store. The
//! [`workflows::screening`] module exposes the orchestrator, the standard
//! stage pipeline, and the service/router layers used by the API binary.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

pub use error::AppError;
