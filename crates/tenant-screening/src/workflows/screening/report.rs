use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ScreeningId, ScreeningStatus};
use super::payload::StagePayload;
use super::stage::StageResult;
use super::stages::decision::DecisionOutcome;

/// Assembled outcome of a finished screening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub screening_id: ScreeningId,
    pub status: ScreeningStatus,
    /// Every stage result, ordered by the execution plan.
    pub stage_results: Vec<StageResult>,
    /// Payload of the terminal stage, `None` when it errored or none is configured.
    pub final_decision: Option<StagePayload>,
    pub failed_stages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: u64,
}

impl FinalReport {
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|result| result.stage == stage)
    }

    pub fn decision(&self) -> Option<&DecisionOutcome> {
        match &self.final_decision {
            Some(StagePayload::Decision(outcome)) => Some(outcome),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.stage_results
            .iter()
            .filter(|result| result.is_success())
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.status == ScreeningStatus::Completed && self.failed_stages.is_empty()
    }
}

/// In-flight progress of a screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreeningProgress {
    pub screening_id: ScreeningId,
    pub status: ScreeningStatus,
    pub stages_completed: usize,
    pub stages_total: usize,
    pub created_at: DateTime<Utc>,
}

impl ScreeningProgress {
    pub fn fraction_complete(&self) -> f32 {
        if self.stages_total == 0 {
            return 1.0;
        }
        self.stages_completed as f32 / self.stages_total as f32
    }
}
