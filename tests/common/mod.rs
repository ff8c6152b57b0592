#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use portal_verifier::config::AppConfig;
use portal_verifier::{PortalBrowser, PortalPage};

pub const BASE_URL: &str = "https://portal.test/records/view?id=";
pub const MARKER: &str = "Active admission";
pub const LOGIN_FORM: &str = "form#login";

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> Vec<u8> {
    std::fs::read(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Configuration pointing at the scripted portal, with no settle delay.
pub fn test_config() -> AppConfig {
    let raw = format!(
        r#"
[portal]
base_url = "{BASE_URL}"
marker = "{MARKER}"
login_form_selector = "{LOGIN_FORM}"

[portal.login]
username = "operator"
password = "secret"
username_selector = "input[name=UserName]"
password_selector = "input[name=Password]"
facility_selector = "select#facility"
facility_code = "12"
location_selector = "select#location"
location_code = "7"
submit_selector = "input[type=submit]"

[batch]
size = 10
cooldown_secs = 1

[pacing]
settle_delay_ms = 0

[input]
key_column = "Id"
auxiliary_columns = ["Paciente", "Fecha", "Motivo"]

[report]
title = "Verified Records"
"#
    );
    let config: AppConfig = toml::from_str(&raw).expect("test config should parse");
    config.validate().expect("test config should validate");
    config
}

pub fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

/// Record URL for `key` on the scripted portal.
pub fn url(key: &str) -> String {
    format!("{}{}", BASE_URL, key)
}

/// A page that shows the marker.
pub fn matching_page() -> String {
    format!("<html><body><h1>Record</h1><p>{}</p></body></html>", MARKER)
}

pub fn plain_page() -> String {
    "<html><body><h1>Record</h1><p>Discharged</p></body></html>".to_string()
}

/// When the scripted portal shows its login form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginGate {
    Never,
    /// Until someone has logged in
    UntilAuthenticated,
    /// On every freshly opened page, even after logging in
    EveryNewPage,
}

#[derive(Debug, Default)]
pub struct PortalLog {
    pub opened: usize,
    pub closed: usize,
    pub navigations: Vec<String>,
    pub authentications: usize,
    pub filled: Vec<(String, String)>,
    pub selected: Vec<(String, String)>,
}

impl PortalLog {
    pub fn open_pages(&self) -> usize {
        self.opened - self.closed
    }

    pub fn interactions(&self) -> usize {
        self.opened + self.navigations.len()
    }
}

struct PortalState {
    pages: HashMap<String, String>,
    content_failures: HashSet<String>,
    navigation_failures: HashSet<String>,
    gate: LoginGate,
    login_fails: bool,
    authenticated: bool,
    next_page: usize,
    log: PortalLog,
}

/// In-memory portal standing in for headless Chrome.
#[derive(Clone)]
pub struct ScriptedPortal {
    state: Arc<Mutex<PortalState>>,
}

impl ScriptedPortal {
    pub fn new(gate: LoginGate) -> Self {
        Self {
            state: Arc::new(Mutex::new(PortalState {
                pages: HashMap::new(),
                content_failures: HashSet::new(),
                navigation_failures: HashSet::new(),
                gate,
                login_fails: false,
                authenticated: false,
                next_page: 0,
                log: PortalLog::default(),
            })),
        }
    }

    pub fn with_page(self, key: &str, html: String) -> Self {
        self.state.lock().unwrap().pages.insert(url(key), html);
        self
    }

    /// Reading the page for `key` fails.
    pub fn with_broken_page(self, key: &str) -> Self {
        self.state.lock().unwrap().content_failures.insert(url(key));
        self
    }

    /// Navigating to `key` fails.
    pub fn with_unreachable_page(self, key: &str) -> Self {
        self.state.lock().unwrap().navigation_failures.insert(url(key));
        self
    }

    pub fn with_rejected_login(self) -> Self {
        self.state.lock().unwrap().login_fails = true;
        self
    }

    pub fn log<T>(&self, f: impl FnOnce(&PortalLog) -> T) -> T {
        f(&self.state.lock().unwrap().log)
    }
}

#[async_trait]
impl PortalBrowser for ScriptedPortal {
    type Page = ScriptedPage;

    async fn open_page(&self) -> Result<ScriptedPage> {
        let mut state = self.state.lock().unwrap();
        state.log.opened += 1;
        state.next_page += 1;
        Ok(ScriptedPage {
            id: state.next_page,
            state: self.state.clone(),
            current: Mutex::new(String::new()),
            fresh: Mutex::new(true),
        })
    }
}

pub struct ScriptedPage {
    pub id: usize,
    state: Arc<Mutex<PortalState>>,
    current: Mutex<String>,
    /// Not yet past a login form
    fresh: Mutex<bool>,
}

#[async_trait]
impl PortalPage for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.navigations.push(url.to_string());
        if state.navigation_failures.contains(url) {
            return Err(anyhow!("net::ERR_CONNECTION_RESET at {}", url));
        }
        *self.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_until_navigated(&self) -> Result<()> {
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        if selector != LOGIN_FORM {
            return Ok(false);
        }
        let state = self.state.lock().unwrap();
        Ok(match state.gate {
            LoginGate::Never => false,
            LoginGate::UntilAuthenticated => !state.authenticated,
            LoginGate::EveryNewPage => *self.fresh.lock().unwrap(),
        })
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.filled.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.selected.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.login_fails {
            return Err(anyhow!("invalid credentials"));
        }
        state.authenticated = true;
        state.log.authentications += 1;
        *self.fresh.lock().unwrap() = false;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        let current = self.current.lock().unwrap().clone();
        let state = self.state.lock().unwrap();
        if state.content_failures.contains(&current) {
            return Err(anyhow!("Target closed while reading {}", current));
        }
        Ok(state
            .pages
            .get(&current)
            .cloned()
            .unwrap_or_else(|| "<html><body>Not found</body></html>".to_string()))
    }

    async fn title(&self) -> Result<String> {
        Ok(format!("Page {}", self.id))
    }

    fn close(&self) -> Result<()> {
        self.state.lock().unwrap().log.closed += 1;
        Ok(())
    }
}

/// CSV with an `Id` column and the auxiliary columns from `test_config`.
pub fn csv_input(keys: &[&str]) -> Vec<u8> {
    let mut out = String::from("Id,Paciente,Fecha,Motivo\n");
    for key in keys {
        out.push_str(&format!("{key},Patient {key},01/05/2024,Control\n"));
    }
    out.into_bytes()
}
