//! Configuration management for portal-verifier
//!
//! All configuration is loaded from `./config/portal-verifier.toml`.
//! Defaults live in the config template; source code only fills in optional
//! knobs. Portal credentials may come from the environment instead of the file.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::batch::{DEFAULT_BATCH_SIZE, TEST_BATCH_SIZE};
use crate::input::RecordSchema;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/portal-verifier.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/portal-verifier.toml");

/// Environment variable overriding `portal.login.username`
pub const USERNAME_ENV: &str = "PORTAL_VERIFIER_USERNAME";
/// Environment variable overriding `portal.login.password`
pub const PASSWORD_ENV: &str = "PORTAL_VERIFIER_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    NotPositive { field: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub batch: BatchConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Target portal and the text that marks a record as present
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Prefix every record key is appended to
    pub base_url: String,
    /// Substring whose presence in the rendered page means "matched"
    pub marker: String,
    /// Selector whose visibility means the portal is asking for a login
    pub login_form_selector: String,
    pub login: LoginConfig,
}

impl PortalConfig {
    pub fn service_name(&self) -> String {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.base_url.clone())
    }
}

/// Login form layout and the account used to fill it
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub username_selector: String,
    pub password_selector: String,
    /// Facility `<select>`; choosing it populates the sub-location list
    pub facility_selector: String,
    pub facility_code: String,
    /// Sub-location `<select>` that only appears once the form is ready
    pub location_selector: String,
    pub location_code: String,
    pub submit_selector: String,
    /// Upper bound on waiting for the sub-location control
    #[serde(default = "default_dependent_control_timeout_ms")]
    pub dependent_control_timeout_ms: u64,
}

fn default_dependent_control_timeout_ms() -> u64 {
    10_000
}

impl LoginConfig {
    pub fn dependent_control_timeout(&self) -> Duration {
        Duration::from_millis(self.dependent_control_timeout_ms)
    }
}

/// Chrome launch options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Turned off automatically inside containers
    pub sandbox: bool,
    /// Explicit Chrome binary; falls back to `CHROME_PATH`, then auto-detection
    pub chrome_path: Option<String>,
    pub navigation_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chrome_path: None,
            navigation_timeout_secs: 30,
            idle_timeout_secs: 300,
            window_width: 1280,
            window_height: 900,
        }
    }
}

/// Batch partitioning and the pause between batches
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Batch size for quick trial runs
    #[serde(default = "default_test_batch_size")]
    pub test_size: usize,
    pub cooldown_secs: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_test_batch_size() -> usize {
    TEST_BATCH_SIZE
}

impl BatchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Per-record pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Extra wait after the DOM has loaded, for scripts that fill the page
    pub settle_delay_ms: u64,
    /// Cap on navigations per second; 0 disables the cap
    pub max_navigations_per_second: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            max_navigations_per_second: 0,
        }
    }
}

impl PacingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Default columns for the input file
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub key_column: String,
    #[serde(default)]
    pub auxiliary_columns: Vec<String>,
    /// Fields shown per matched record in the HTML summary; defaults to the
    /// auxiliary columns
    #[serde(default)]
    pub snapshot_fields: Vec<String>,
}

impl InputConfig {
    pub fn schema(&self) -> RecordSchema {
        let snapshot = if self.snapshot_fields.is_empty() {
            self.auxiliary_columns.clone()
        } else {
            self.snapshot_fields.clone()
        };
        RecordSchema::new(self.key_column.clone(), self.auxiliary_columns.clone())
            .with_snapshot_fields(snapshot)
    }
}

/// Report output options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: String,
    /// Heading of the HTML summary
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            title: "Verified Records".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace credentials with `PORTAL_VERIFIER_USERNAME` / `PORTAL_VERIFIER_PASSWORD`
    /// when they are set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            self.portal.login.username = username;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.portal.login.password = password;
        }
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.portal.base_url;
        if base_url.is_empty() {
            return Err(empty("portal.base_url"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://"))
            || url::Url::parse(base_url).is_err()
        {
            return Err(ConfigError::InvalidUrl {
                field: "portal.base_url".to_string(),
                url: base_url.clone(),
            });
        }
        if self.portal.marker.is_empty() {
            return Err(empty("portal.marker"));
        }
        if self.portal.login_form_selector.is_empty() {
            return Err(empty("portal.login_form_selector"));
        }

        let login = &self.portal.login;
        for (field, value) in [
            ("portal.login.username_selector", &login.username_selector),
            ("portal.login.password_selector", &login.password_selector),
            ("portal.login.facility_selector", &login.facility_selector),
            ("portal.login.location_selector", &login.location_selector),
            ("portal.login.submit_selector", &login.submit_selector),
        ] {
            if value.is_empty() {
                return Err(empty(field));
            }
        }
        if login.dependent_control_timeout_ms == 0 {
            return Err(not_positive("portal.login.dependent_control_timeout_ms"));
        }

        if self.browser.navigation_timeout_secs == 0 {
            return Err(not_positive("browser.navigation_timeout_secs"));
        }
        if self.batch.size == 0 {
            return Err(not_positive("batch.size"));
        }
        if self.batch.test_size == 0 {
            return Err(not_positive("batch.test_size"));
        }
        if self.input.key_column.trim().is_empty() {
            return Err(empty("input.key_column"));
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Refuse to overwrite an existing config
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn empty(field: &str) -> ConfigError {
    ConfigError::EmptyRequired {
        field: field.to_string(),
    }
}

fn not_positive(field: &str) -> ConfigError {
    ConfigError::NotPositive {
        field: field.to_string(),
    }
}
