//! Per-record verification: resolve the record URL, load it through the
//! session, wait for the page to settle, and look for the marker text.
//!
//! Anything that goes wrong for a single record becomes an `Errored` outcome.
//! Only a failed login escapes as an error, since no later record could
//! succeed without it.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::VerifyError;
use crate::input::{InputRecord, ResolvedSchema};
use crate::portal::{PortalBrowser, PortalPage};
use crate::rate_limit::RateLimiter;
use crate::results::VerificationOutcome;
use crate::session::{AcquireError, Session};

/// Number of content characters included in debug logs
const PREVIEW_CHARS: usize = 500;

/// Full record URL: the key appended verbatim to the base.
pub fn resolve_url(base_url: &str, key: &str) -> String {
    format!("{}{}", base_url, key)
}

pub struct RecordVerifier {
    base_url: String,
    marker: String,
    settle_delay: Duration,
    limiter: Option<RateLimiter>,
}

impl RecordVerifier {
    pub fn new(base_url: impl Into<String>, marker: impl Into<String>, settle_delay: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            marker: marker.into(),
            settle_delay,
            limiter: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.portal.base_url.clone(),
            config.portal.marker.clone(),
            config.pacing.settle_delay(),
        )
        .with_rate_limit(RateLimiter::from_config(&config.pacing))
    }

    pub fn with_rate_limit(mut self, limiter: Option<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Time spent waiting on the navigation cap so far.
    pub fn throttled(&self) -> Duration {
        self.limiter.as_ref().map(RateLimiter::waited).unwrap_or_default()
    }

    /// Verify one record. Returns `Err` only when the run must stop.
    pub async fn verify<B: PortalBrowser>(
        &mut self,
        session: &mut Session<B>,
        record: &InputRecord,
        schema: &ResolvedSchema,
    ) -> Result<VerificationOutcome, VerifyError> {
        let url = resolve_url(&self.base_url, &record.key);

        if let Some(limiter) = self.limiter.as_mut() {
            limiter.acquire().await;
        }

        info!("Verifying record {}", record.key);

        let classified = match session.acquire_page(&url).await {
            Ok(page) => self.classify(&*page, &record.key).await,
            Err(AcquireError::Fatal(e)) => return Err(e),
            Err(AcquireError::Record(e)) => Err(e),
        };

        Ok(match classified {
            Ok(true) => VerificationOutcome::matched(record.clone(), url, schema),
            Ok(false) => VerificationOutcome::unmatched(record.clone(), url),
            Err(e) => {
                warn!("Error verifying record {}: {:#}", record.key, e);
                VerificationOutcome::errored(record.clone(), url, format!("{:#}", e))
            }
        })
    }

    /// Wait for the page to finish loading and test it for the marker.
    async fn classify<P: PortalPage>(&self, page: &P, key: &str) -> anyhow::Result<bool> {
        page.wait_until_navigated().await?;
        sleep(self.settle_delay).await;

        let content = page.content().await?;
        let title = page.title().await.unwrap_or_default();
        let found = content.contains(&self.marker);

        debug!(
            "Record {}: {} chars, title '{}', marker '{}' {}",
            key,
            content.len(),
            title,
            self.marker,
            if found { "found" } else { "not found" }
        );
        debug!(
            "Record {} content preview: {}",
            key,
            content.chars().take(PREVIEW_CHARS).collect::<String>()
        );

        Ok(found)
    }
}
