//! Headless Chrome launch for portal sessions.
//!
//! The portal tolerates one logged-in session per account, so a process-wide
//! permit caps live portal browsers at one. A second launch blocks until the
//! first `ChromePortal` is dropped.
//!
//! The permit uses std::sync primitives and is only ever waited on from the
//! blocking pool, alongside the Chrome startup itself.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::debug;

use crate::config::BrowserConfig;
use crate::portal::{PortalBrowser, PortalPage};

const MAX_PORTAL_SESSIONS: usize = 1;

static SESSION_SEMAPHORE: once_cell::sync::Lazy<SessionSemaphore> =
    once_cell::sync::Lazy::new(|| SessionSemaphore::new(MAX_PORTAL_SESSIONS));

/// Counting semaphore usable outside an async context.
struct SessionSemaphore {
    state: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl SessionSemaphore {
    fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(0),
            condvar: Condvar::new(),
            max,
        }
    }

    /// Acquire a permit, blocking until one is available.
    fn acquire(&self) -> SessionPermit<'_> {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *count >= self.max {
            count = self.condvar.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count += 1;
        SessionPermit { semaphore: self }
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        self.condvar.notify_one();
    }
}

/// Releases the session permit on drop.
struct SessionPermit<'a> {
    semaphore: &'a SessionSemaphore,
}

impl Drop for SessionPermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Whether Chrome must run without its sandbox (containers usually lack the
/// namespaces it needs).
fn running_in_container() -> bool {
    std::env::var("PORTAL_VERIFIER_CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists()
}

/// Chrome binary to launch: explicit config, then `CHROME_PATH`, then
/// headless_chrome's own lookup.
pub(crate) fn chrome_executable(config: &BrowserConfig) -> Option<PathBuf> {
    config
        .chrome_path
        .as_ref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var("CHROME_PATH").ok().map(PathBuf::from))
}

/// Run blocking browser work on tokio's blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow!("Browser task failed: {}", e))?
}

/// One Chrome process serving a single portal session.
///
/// Dropping it kills the browser and frees the session permit.
pub struct ChromePortal {
    browser: Arc<Browser>,
    navigation_timeout: Duration,
    _permit: SessionPermit<'static>,
}

impl ChromePortal {
    /// Launch Chrome with the configured options. Waits while another portal
    /// browser is alive in this process.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let config = config.clone();
        // Both the permit wait and the Chrome startup block
        run_blocking(move || Self::launch_blocking(&config)).await
    }

    fn launch_blocking(config: &BrowserConfig) -> Result<Self> {
        let permit = SESSION_SEMAPHORE.acquire();

        let sandbox = !running_in_container() && config.sandbox;
        let path = chrome_executable(config);
        debug!(
            "Launching Chrome (headless: {}, sandbox: {}, path: {:?})",
            config.headless, sandbox, path
        );

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(sandbox)
            .path(path)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build Chrome launch options: {}", e))?;

        let browser =
            Browser::new(options).map_err(|e| anyhow!("Failed to launch headless Chrome: {}", e))?;

        Ok(Self {
            browser: Arc::new(browser),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            _permit: permit,
        })
    }
}

#[async_trait]
impl PortalBrowser for ChromePortal {
    type Page = ChromePage;

    async fn open_page(&self) -> Result<ChromePage> {
        let browser = self.browser.clone();
        let timeout = self.navigation_timeout;
        let tab = run_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| anyhow!("Failed to create new browser tab: {}", e))?;
            tab.set_default_timeout(timeout);
            Ok(tab)
        })
        .await?;
        Ok(ChromePage { tab })
    }
}

/// A Chrome tab. Every call runs on the blocking pool against a clone of the
/// shared tab handle.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn with_tab<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        run_blocking(move || work(&*tab)).await
    }

    /// Evaluate a boolean-valued expression in the page.
    async fn evaluate_bool(&self, expression: String) -> Result<bool> {
        self.with_tab(move |tab| {
            let result = tab
                .evaluate(&expression, false)
                .map_err(|e| anyhow!("Script evaluation failed: {}", e))?;
            Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
        })
        .await
    }
}

/// Quote a selector or value for embedding in a script.
fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_string()).to_string()
}

#[async_trait]
impl PortalPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?
                .wait_until_navigated()
                .map_err(|e| anyhow!("Page failed to load: {}", e))?;
            Ok(())
        })
        .await
    }

    async fn wait_until_navigated(&self) -> Result<()> {
        self.with_tab(|tab| {
            tab.wait_until_navigated()
                .map_err(|e| anyhow!("Page failed to load: {}", e))?;
            Ok(())
        })
        .await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             const style = window.getComputedStyle(el); const rect = el.getBoundingClientRect(); \
             return style.visibility !== 'hidden' && style.display !== 'none' \
             && rect.width > 0 && rect.height > 0; }})()",
            js_string(selector)
        );
        self.evaluate_bool(script).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map_err(|e| anyhow!("Timed out waiting for {}: {}", selector, e))?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let selector = selector.to_string();
        let value = value.to_string();
        self.with_tab(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|e| anyhow!("Field {} not found: {}", selector, e))?;
            element
                .click()
                .map_err(|e| anyhow!("Failed to focus {}: {}", selector, e))?;
            element
                .type_into(&value)
                .map_err(|e| anyhow!("Failed to type into {}: {}", selector, e))?;
            Ok(())
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             const opt = Array.from(el.options).find(o => o.value === {}); if (!opt) return false; \
             el.value = opt.value; el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            js_string(selector),
            js_string(value)
        );
        if self.evaluate_bool(script).await? {
            Ok(())
        } else {
            Err(anyhow!("Option '{}' not available in {}", value, selector))
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.find_element(&selector)
                .map_err(|e| anyhow!("Element {} not found: {}", selector, e))?
                .click()
                .map_err(|e| anyhow!("Failed to click {}: {}", selector, e))?;
            Ok(())
        })
        .await
    }

    async fn content(&self) -> Result<String> {
        self.with_tab(|tab| {
            tab.get_content()
                .map_err(|e| anyhow!("Failed to get page content: {}", e))
        })
        .await
    }

    async fn title(&self) -> Result<String> {
        self.with_tab(|tab| {
            tab.get_title()
                .map_err(|e| anyhow!("Failed to get page title: {}", e))
        })
        .await
    }

    fn close(&self) -> Result<()> {
        let tab = self.tab.clone();
        let close = move || {
            if let Err(e) = tab.close(true) {
                debug!("Failed to close tab: {}", e);
            }
        };
        // Inside the runtime the close is handed to the blocking pool
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
        Ok(())
    }
}
