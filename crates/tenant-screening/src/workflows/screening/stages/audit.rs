use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::screening::context::StageInput;
use crate::workflows::screening::domain::ScreeningId;
use crate::workflows::screening::payload::StagePayload;
use crate::workflows::screening::stage::{Stage, StageError, StageStatus};

use super::decision::ScreeningDecision;
use super::{bias_of, compliance_of, decision_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: String,
    pub status: StageStatus,
    pub summary: String,
}

/// Durable trail of what the decision was based on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub screening_id: ScreeningId,
    pub recorded_at: DateTime<Utc>,
    pub decision: Option<ScreeningDecision>,
    pub compliance_verified: bool,
    pub bias_checked: bool,
    pub adverse_action_required: bool,
    pub stage_log: Vec<AuditEntry>,
}

/// Records the outcome of its dependencies. Always succeeds so that partial
/// screenings still leave a trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditStage;

#[async_trait]
impl Stage for AuditStage {
    async fn execute(&self, input: &StageInput) -> Result<StagePayload, StageError> {
        let stage_log = input
            .dependencies()
            .map(|result| AuditEntry {
                stage: result.stage.clone(),
                status: result.status(),
                summary: match (result.payload(), result.failure_detail()) {
                    (Some(payload), _) => payload.summary(),
                    (None, Some(failure)) => failure.to_string(),
                    (None, None) => String::new(),
                },
            })
            .collect();

        let compliance = compliance_of(input);
        let screening_id = input.screening_id().clone();

        Ok(StagePayload::Audit(AuditRecord {
            audit_id: format!("AUDIT-{screening_id}"),
            screening_id,
            recorded_at: Utc::now(),
            decision: decision_of(input).map(|outcome| outcome.decision),
            compliance_verified: compliance.is_some(),
            bias_checked: bias_of(input).is_some(),
            adverse_action_required: compliance.is_some_and(|review| review.adverse_action_required),
            stage_log,
        }))
    }
}
