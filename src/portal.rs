//! Browser seam used by the session and the verifier.
//!
//! The production implementation drives headless Chrome (see `browser_pool`)
//! and moves every blocking browser call off the async runtime; tests plug in
//! a scripted browser. `close` stays synchronous so a page can be closed from
//! `Drop`; implementations must not block in it.

use std::ops::Deref;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Something that can hand out fresh pages inside one browser context.
#[async_trait]
pub trait PortalBrowser: Send + Sync {
    type Page: PortalPage;

    async fn open_page(&self) -> Result<Self::Page>;
}

/// Operations the verification flow needs from a single page.
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Start navigation to `url` and wait for the document to load.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until the current navigation has settled.
    async fn wait_until_navigated(&self) -> Result<()>;

    /// Whether an element matching `selector` is present and visible right now.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Choose the option with value `value` in the `<select>` at `selector`.
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn content(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Close the page. Must return promptly; slow work may be deferred.
    fn close(&self) -> Result<()>;
}

/// A page this code opened and must close.
///
/// Closing happens on drop unless ownership is taken back with `into_inner`.
/// Close errors are logged and otherwise ignored.
pub struct OwnedPage<P: PortalPage> {
    page: Option<P>,
}

impl<P: PortalPage> OwnedPage<P> {
    pub fn new(page: P) -> Self {
        Self { page: Some(page) }
    }

    /// Hand the page over without closing it.
    pub fn into_inner(mut self) -> Option<P> {
        self.page.take()
    }
}

impl<P: PortalPage> Deref for OwnedPage<P> {
    type Target = P;

    fn deref(&self) -> &P {
        // Only `into_inner` empties the slot, and it consumes the guard
        match &self.page {
            Some(page) => page,
            None => unreachable!("OwnedPage accessed after into_inner"),
        }
    }
}

impl<P: PortalPage> Drop for OwnedPage<P> {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close() {
                tracing::debug!("Failed to close page: {}", e);
            }
        }
    }
}

/// A page handed out for one record.
///
/// `Owned` pages are closed when the lease ends. `Primary` borrows the
/// authenticated page, which outlives every lease.
pub enum PageLease<'a, P: PortalPage> {
    Owned(OwnedPage<P>),
    Primary(&'a P),
}

impl<P: PortalPage> PageLease<'_, P> {
    pub fn is_primary(&self) -> bool {
        matches!(self, PageLease::Primary(_))
    }
}

impl<P: PortalPage> Deref for PageLease<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self {
            PageLease::Owned(page) => &**page,
            PageLease::Primary(page) => *page,
        }
    }
}
