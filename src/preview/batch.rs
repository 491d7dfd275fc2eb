use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::service::{PreviewOutcome, PreviewService};
use crate::config::Config;
use crate::db::{
    claim_work_for_preview, count_works_needing_preview, get_works_needing_preview,
    record_preview_failure, record_preview_no_images, set_preview_done, set_preview_unsupported,
    Database, Work,
};

pub const DEFAULT_BATCH_SIZE: i64 = 10;
pub const MAX_BATCH_SIZE: i64 = 100;

const MAX_REPORTED_ERRORS: usize = 20;
const ERROR_TITLE_CHARS: usize = 50;

/// Parameters of one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: i64,
    pub max_attempts: i64,
    pub lease: Duration,
    pub pacing: Duration,
}

impl BatchOptions {
    /// Options from configuration with the given batch size, clamped to `1..=100`.
    #[must_use]
    pub fn from_config(config: &Config, batch_size: i64) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            max_attempts: config.preview_max_attempts,
            lease: config.preview_lease,
            pacing: config.batch_pacing,
        }
    }
}

/// One record that ended without a preview.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub work_id: i64,
    pub title: String,
    pub error: String,
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub processed: usize,
    pub successful: usize,
    pub no_images: usize,
    pub unsupported: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}

impl BatchStats {
    fn record(&mut self, work: &Work, outcome: &PreviewOutcome) {
        self.processed += 1;
        match outcome {
            PreviewOutcome::Extracted { .. } => self.successful += 1,
            PreviewOutcome::NoImages => self.no_images += 1,
            PreviewOutcome::Unsupported { .. } => self.unsupported += 1,
            PreviewOutcome::Failed { error } => {
                self.failed += 1;
                if self.errors.len() < MAX_REPORTED_ERRORS {
                    self.errors.push(BatchError {
                        work_id: work.id,
                        title: work.title.chars().take(ERROR_TITLE_CHARS).collect(),
                        error: error.clone(),
                    });
                }
            }
        }
    }
}

/// Outcome of a batch run, returned as the response body.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub message: String,
    pub stats: BatchStats,
    pub remaining: i64,
}

/// Generate previews for up to `batch_size` works that still lack one.
///
/// Each selected work is leased, handed to `service`, and its outcome written
/// back before the lease is released. Per-record failures are counted, never
/// returned; an error here means the batch could not start or the catalog
/// became unreachable between records.
///
/// # Errors
///
/// Returns an error if the selection or final count queries fail.
pub async fn run_preview_batch(
    db: &Database,
    service: &dyn PreviewService,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let pool = db.pool();
    let works = get_works_needing_preview(pool, options.batch_size, options.max_attempts).await?;

    if works.is_empty() {
        let remaining = count_works_needing_preview(pool, options.max_attempts).await?;
        info!(remaining, "No works waiting for previews");
        return Ok(BatchReport {
            success: true,
            message: "All works processed".to_string(),
            stats: BatchStats::default(),
            remaining,
        });
    }

    info!(selected = works.len(), batch_size = options.batch_size, "Starting preview batch");

    let lease_secs = options.lease.as_secs().max(1) as i64;
    let mut stats = BatchStats::default();

    for (position, work) in works.iter().enumerate() {
        if position > 0 && !options.pacing.is_zero() {
            tokio::time::sleep(options.pacing).await;
        }

        match claim_work_for_preview(pool, work.id, lease_secs).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(work_id = work.id, "Work leased by another run, skipping");
                continue;
            }
            Err(e) => {
                warn!(work_id = work.id, "Failed to lease work: {e:#}");
                stats.record(
                    work,
                    &PreviewOutcome::Failed {
                        error: format!("failed to lease work: {e}"),
                    },
                );
                continue;
            }
        }

        let outcome = service.generate(work).await;
        stats.record(work, &outcome);

        if let Err(e) = write_outcome(db, work.id, &outcome).await {
            warn!(work_id = work.id, "Failed to record preview outcome: {e:#}");
        }
    }

    let remaining = count_works_needing_preview(pool, options.max_attempts).await?;
    let message = format!(
        "Processed {} works: {} with previews, {} without images, {} unsupported, {} failed",
        stats.processed, stats.successful, stats.no_images, stats.unsupported, stats.failed
    );
    info!(
        processed = stats.processed,
        successful = stats.successful,
        no_images = stats.no_images,
        unsupported = stats.unsupported,
        failed = stats.failed,
        remaining,
        "Preview batch complete"
    );

    Ok(BatchReport {
        success: true,
        message,
        stats,
        remaining,
    })
}

async fn write_outcome(db: &Database, work_id: i64, outcome: &PreviewOutcome) -> Result<()> {
    let pool = db.pool();
    match outcome {
        PreviewOutcome::Extracted { .. } => set_preview_done(pool, work_id).await,
        PreviewOutcome::NoImages => record_preview_no_images(pool, work_id).await,
        PreviewOutcome::Unsupported { reason } => {
            set_preview_unsupported(pool, work_id, reason).await
        }
        PreviewOutcome::Failed { error } => record_preview_failure(pool, work_id, error).await,
    }
}
