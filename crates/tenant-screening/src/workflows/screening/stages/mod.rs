//! The standard tenant screening pipeline.
//!
//! ```text
//! wave 0: ingestion, identity
//! wave 1: credit
//! wave 2: fraud, risk
//! wave 3: decision
//! wave 4: compliance, bias
//! wave 5: audit
//! ```

pub mod audit;
pub mod bias;
pub mod compliance;
pub mod credit;
pub mod decision;
pub mod fraud;
pub mod identity;
pub mod ingestion;
pub mod risk;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::StageInput;
use super::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
use super::payload::StagePayload;
use super::stage::StageDefinition;

use self::audit::AuditStage;
use self::bias::{BiasReview, BiasStage};
use self::compliance::{ComplianceReview, ComplianceStage};
use self::credit::{CreditBureau, CreditReport, CreditStage};
use self::decision::{DecisionOutcome, DecisionStage};
use self::fraud::{FraudAssessment, FraudStage};
use self::identity::{IdentityAssessment, IdentityStage};
use self::ingestion::{ApplicantProfile, IngestionStage};
use self::risk::{RiskAssessment, RiskStage};

pub const INGESTION: &str = "ingestion";
pub const IDENTITY: &str = "identity";
pub const CREDIT: &str = "credit";
pub const FRAUD: &str = "fraud";
pub const RISK: &str = "risk";
pub const DECISION: &str = "decision";
pub const COMPLIANCE: &str = "compliance";
pub const BIAS: &str = "bias";
pub const AUDIT: &str = "audit";

/// Coarse three-band classification shared by fraud, risk, and bias output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

/// Stage definitions for the standard pipeline, registered in the order that
/// fixes their position within each wave.
pub fn standard_pipeline(bureau: Arc<dyn CreditBureau>) -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(INGESTION, &[], IngestionStage),
        StageDefinition::new(IDENTITY, &[], IdentityStage::default()),
        StageDefinition::new(CREDIT, &[INGESTION], CreditStage::new(bureau)),
        StageDefinition::new(FRAUD, &[INGESTION, IDENTITY, CREDIT], FraudStage::default()),
        StageDefinition::new(RISK, &[INGESTION, CREDIT], RiskStage),
        StageDefinition::new(
            DECISION,
            &[INGESTION, IDENTITY, CREDIT, FRAUD, RISK],
            DecisionStage::default(),
        ),
        StageDefinition::new(COMPLIANCE, &[DECISION], ComplianceStage),
        StageDefinition::new(BIAS, &[DECISION], BiasStage),
        StageDefinition::new(AUDIT, &[DECISION, COMPLIANCE, BIAS], AuditStage),
    ]
}

/// Orchestrator over the standard pipeline with `decision` as the terminal
/// stage.
pub fn standard_orchestrator(
    bureau: Arc<dyn CreditBureau>,
    config: OrchestratorConfig,
) -> Result<Orchestrator, OrchestratorError> {
    let config = if config.terminal_stage.is_some() {
        config
    } else {
        config.with_terminal_stage(DECISION)
    };
    Orchestrator::new(standard_pipeline(bureau), config)
}

pub(crate) fn profile_of(input: &StageInput) -> Option<&ApplicantProfile> {
    match input.payload(INGESTION) {
        Some(StagePayload::Profile(profile)) => Some(profile),
        _ => None,
    }
}

pub(crate) fn identity_of(input: &StageInput) -> Option<&IdentityAssessment> {
    match input.payload(IDENTITY) {
        Some(StagePayload::Identity(identity)) => Some(identity),
        _ => None,
    }
}

pub(crate) fn credit_of(input: &StageInput) -> Option<&CreditReport> {
    match input.payload(CREDIT) {
        Some(StagePayload::Credit(report)) => Some(report),
        _ => None,
    }
}

pub(crate) fn fraud_of(input: &StageInput) -> Option<&FraudAssessment> {
    match input.payload(FRAUD) {
        Some(StagePayload::Fraud(fraud)) => Some(fraud),
        _ => None,
    }
}

pub(crate) fn risk_of(input: &StageInput) -> Option<&RiskAssessment> {
    match input.payload(RISK) {
        Some(StagePayload::Risk(risk)) => Some(risk),
        _ => None,
    }
}

pub(crate) fn decision_of(input: &StageInput) -> Option<&DecisionOutcome> {
    match input.payload(DECISION) {
        Some(StagePayload::Decision(decision)) => Some(decision),
        _ => None,
    }
}

pub(crate) fn compliance_of(input: &StageInput) -> Option<&ComplianceReview> {
    match input.payload(COMPLIANCE) {
        Some(StagePayload::Compliance(review)) => Some(review),
        _ => None,
    }
}

pub(crate) fn bias_of(input: &StageInput) -> Option<&BiasReview> {
    match input.payload(BIAS) {
        Some(StagePayload::Bias(review)) => Some(review),
        _ => None,
    }
}
