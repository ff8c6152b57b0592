//! Batch scheduling for verification runs
//!
//! Records are split into contiguous windows of at most `batch_size`. Windows
//! run one after another with a cooldown between them so the portal is not
//! hammered; there is no cooldown after the last window. Records inside a
//! window are verified one at a time in input order.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::info;

use crate::error::VerifyError;
use crate::input::{InputRecord, ResolvedSchema};
use crate::logger::RunLogger;
use crate::portal::PortalBrowser;
use crate::results::ResultSet;
use crate::session::Session;
use crate::verifier::RecordVerifier;

/// Default number of records per window
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Window size used by trial runs
pub const TEST_BATCH_SIZE: usize = 2;

/// A contiguous slice of the input, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchWindow {
    pub start: usize,
    pub len: usize,
}

impl BatchWindow {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// What a completed schedule produced.
#[derive(Debug)]
pub struct ScheduleOutcome {
    pub results: ResultSet,
    pub windows: usize,
    /// Cooldowns actually slept; always `windows - 1` for a non-empty run
    pub cooldowns: usize,
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    cooldown: Duration,
}

impl BatchScheduler {
    /// A zero batch size is treated as 1.
    pub fn new(batch_size: usize, cooldown: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cooldown,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Split `total` records into `ceil(total / batch_size)` windows.
    pub fn windows(&self, total: usize) -> Vec<BatchWindow> {
        (0..total)
            .step_by(self.batch_size)
            .map(|start| BatchWindow {
                start,
                len: self.batch_size.min(total - start),
            })
            .collect()
    }

    /// Verify every record, window by window.
    ///
    /// Stops early only when the verifier reports a run-ending failure.
    pub async fn run<B: PortalBrowser>(
        &self,
        records: &[InputRecord],
        schema: &ResolvedSchema,
        session: &mut Session<B>,
        verifier: &mut RecordVerifier,
        logger: &RunLogger,
    ) -> Result<ScheduleOutcome, VerifyError> {
        let windows = self.windows(records.len());
        let mut results = ResultSet::new();
        let mut cooldowns = 0;

        logger.log_run_start(records.len(), windows.len(), self.batch_size);

        for (i, window) in windows.iter().enumerate() {
            info!("Processing batch {} ({}..{})", i + 1, window.start, window.end());
            logger.log_window_start(i + 1, windows.len(), window.len);

            for record in &records[window.start..window.end()] {
                logger
                    .update_progress(&format!("batch {}/{}: {}", i + 1, windows.len(), record.key))
                    .await;

                let outcome = verifier.verify(session, record, schema).await?;
                logger.log_record_outcome(&record.key, &outcome.verdict);
                results.push(outcome);

                logger.advance_progress(1).await;
            }

            if i + 1 < windows.len() {
                logger.log_cooldown(self.cooldown);
                sleep(self.cooldown).await;
                cooldowns += 1;
            }
        }

        Ok(ScheduleOutcome {
            results,
            windows: windows.len(),
            cooldowns,
        })
    }
}
