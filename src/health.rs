//! Liveness check: is a browser available to drive the portal?

use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tracing::debug;

use crate::config::BrowserConfig;

pub const SERVICE_NAME: &str = "portal-verifier";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub browser_available: bool,
    pub browser_version: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.browser_available
    }
}

/// Locate the browser the same way a run would and ask it for its version.
pub fn check(config: &BrowserConfig) -> HealthReport {
    let executable = crate::browser_pool::chrome_executable(config).or_else(|| {
        headless_chrome::browser::default_executable()
            .map_err(|e| debug!("No Chrome executable found: {}", e))
            .ok()
    });

    report_for(executable.as_deref())
}

fn report_for(executable: Option<&Path>) -> HealthReport {
    let browser_version = executable.and_then(browser_version);
    let browser_available = browser_version.is_some();

    HealthReport {
        status: if browser_available { "healthy" } else { "unhealthy" },
        service: SERVICE_NAME,
        browser_available,
        browser_version,
    }
}

fn browser_version(executable: &Path) -> Option<String> {
    match Command::new(executable).arg("--version").output() {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
            Some(if version.is_empty() { "unknown".to_string() } else { version })
        }
        Ok(out) => {
            debug!("{} --version exited with {}", executable.display(), out.status);
            None
        }
        Err(e) => {
            debug!("Failed to run {}: {}", executable.display(), e);
            None
        }
    }
}
