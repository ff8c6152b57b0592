//! End-to-end verification run: load the input, drive the portal, render the
//! reports.
//!
//! Input validation happens before the browser is launched, so a bad file
//! never touches the portal.

use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{error, info};

use crate::batch::BatchScheduler;
use crate::config::AppConfig;
use crate::error::VerifyError;
use crate::export::{render_summary, render_tabular, Artifact};
use crate::input::{load_records, RecordSchema};
use crate::logger::RunLogger;
use crate::portal::PortalBrowser;
use crate::results::RunSummary;
use crate::session::Session;
use crate::verifier::RecordVerifier;

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub schema: RecordSchema,
    pub batch_size: usize,
    pub cooldown: Duration,
    /// Timestamp stamped on both reports; the current local time when unset
    pub generated_at: Option<NaiveDateTime>,
}

impl VerificationRequest {
    /// Request using the configured columns, batch size and cooldown.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            schema: config.input.schema(),
            batch_size: config.batch.size,
            cooldown: config.batch.cooldown(),
            generated_at: None,
        }
    }

    /// Same as `from_config` with the smaller trial batch size.
    pub fn test_variant(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch.test_size,
            ..Self::from_config(config)
        }
    }
}

/// Counters describing how the run went, beyond the record summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub batches: usize,
    pub cooldowns: usize,
    pub authentications: usize,
    pub skipped_rows: usize,
    /// Time spent waiting on `pacing.max_navigations_per_second`
    pub throttled: Duration,
}

/// Everything a caller gets back from a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub message: String,
    pub summary: RunSummary,
    pub stats: RunStats,
    pub tabular: Artifact,
    pub browsable: Artifact,
}

/// Run a full verification.
///
/// `launch` is called once, after the input has been validated, and its
/// future awaited for the browser.
pub async fn run_verification<B, F, Fut>(
    input: &[u8],
    request: &VerificationRequest,
    config: &AppConfig,
    launch: F,
    logger: &RunLogger,
) -> Result<VerificationReport, VerifyError>
where
    B: PortalBrowser,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<B>>,
{
    let loaded = load_records(input, &request.schema)?;
    let schema = loaded.schema;
    let records = loaded.records;

    let browser = launch().await.map_err(|e| VerifyError::BrowserLaunch(format!("{:#}", e)))?;
    let mut session = Session::new(
        browser,
        config.portal.login.clone(),
        config.portal.login_form_selector.clone(),
    );
    let mut verifier = RecordVerifier::from_config(config);
    let scheduler = BatchScheduler::new(request.batch_size, request.cooldown);

    info!(
        "Starting verification of {} records against {} (marker '{}')",
        records.len(),
        config.portal.service_name(),
        verifier.marker()
    );
    logger.start_progress(records.len() as u64).await;

    let scheduled = scheduler
        .run(&records, &schema, &mut session, &mut verifier, logger)
        .await;
    let authentications = session.authentications();
    session.close();

    let scheduled = match scheduled {
        Ok(scheduled) => scheduled,
        Err(e) => {
            logger.finish_progress("Verification aborted").await;
            error!("Verification aborted: {}", e);
            return Err(e);
        }
    };

    let summary = scheduled.results.summary();
    let message = summary.completion_message();
    logger.record_summary(summary);
    logger.finish_progress(&message).await;

    let generated_at = request.generated_at.unwrap_or_else(|| Local::now().naive_local());
    let tabular = render_tabular(&scheduled.results, &schema, generated_at)?;
    let browsable = render_summary(&scheduled.results, &config.report.title, generated_at)?;

    Ok(VerificationReport {
        message,
        summary,
        stats: RunStats {
            batches: scheduled.windows,
            cooldowns: scheduled.cooldowns,
            authentications,
            skipped_rows: loaded.skipped_rows,
            throttled: verifier.throttled(),
        },
        tabular,
        browsable,
    })
}
