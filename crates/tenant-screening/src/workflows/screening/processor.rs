use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ScreeningConfig;

use super::repository::{ApplicationStatus, ScreeningRepository};
use super::service::{ScreeningService, ScreeningServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl From<&ScreeningConfig> for ProcessorConfig {
    fn from(config: &ScreeningConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval,
        }
    }
}

/// Running totals across every batch the processor has handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub batches: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

/// Outcome of a single batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Polls the repository for pending applications and screens them in
/// batches.
pub struct ScreeningProcessor<R> {
    service: Arc<ScreeningService<R>>,
    config: ProcessorConfig,
    stats: Mutex<ProcessorStats>,
}

impl<R> ScreeningProcessor<R>
where
    R: ScreeningRepository + 'static,
{
    pub fn new(service: Arc<ScreeningService<R>>, config: ProcessorConfig) -> Self {
        Self {
            service,
            config,
            stats: Mutex::new(ProcessorStats::default()),
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Screen up to `batch_size` pending applications, one after another.
    /// A screening that ends in a failed status counts as failed. Records
    /// claimed elsewhere after the batch was read are skipped and not
    /// counted.
    pub async fn run_once(&self) -> Result<BatchSummary, ScreeningServiceError> {
        let pending = self.service.pending(self.config.batch_size)?;
        let mut summary = BatchSummary::default();
        if pending.is_empty() {
            debug!("no pending applications");
            return Ok(summary);
        }

        for record in pending {
            match self.service.screen(&record.application_id).await {
                Ok(screened) => {
                    summary.processed += 1;
                    if screened.status == ApplicationStatus::Failed {
                        summary.failed += 1;
                    } else {
                        summary.successful += 1;
                    }
                }
                Err(ScreeningServiceError::NotScreenable { status, .. }) => {
                    debug!(
                        application_id = %record.application_id,
                        status = status.label(),
                        "application already handled"
                    );
                }
                Err(err) => {
                    warn!(application_id = %record.application_id, error = %err, "screening failed");
                    summary.processed += 1;
                    summary.failed += 1;
                }
            }
        }

        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.total_processed += summary.processed as u64;
            stats.successful += summary.successful as u64;
            stats.failed += summary.failed as u64;
            stats.batches += 1;
            stats.last_batch_at = Some(Utc::now());
        }

        info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            "screening batch complete"
        );
        Ok(summary)
    }

    /// Process batches every `poll_interval` until `shutdown` reads `true` or
    /// its sender is dropped. Returns the accumulated statistics.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ProcessorStats {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "screening processor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        error!(error = %err, "unable to load pending applications");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let stats = self.stats();
        info!(
            total_processed = stats.total_processed,
            successful = stats.successful,
            failed = stats.failed,
            "screening processor stopped"
        );
        stats
    }
}
