//! Portal session: lazy login and page hand-out.
//!
//! The session starts anonymous. The first page that lands on the login form
//! is used to log in and then kept as the primary page for the rest of the
//! run. Later login challenges do not log in again: the fresh page is closed
//! and the primary page navigates to the record instead.

use tracing::{debug, info, warn};

use crate::config::LoginConfig;
use crate::error::VerifyError;
use crate::portal::{OwnedPage, PageLease, PortalBrowser, PortalPage};

/// Why a page could not be handed out.
#[derive(Debug)]
pub enum AcquireError {
    /// Affects only the current record
    Record(anyhow::Error),
    /// Aborts the run
    Fatal(VerifyError),
}

impl From<anyhow::Error> for AcquireError {
    fn from(err: anyhow::Error) -> Self {
        AcquireError::Record(err)
    }
}

/// Login progress of a session.
pub enum SessionState<P> {
    Anonymous,
    Authenticated { primary: P },
}

impl<P> SessionState<P> {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

pub struct Session<B: PortalBrowser> {
    browser: B,
    login: LoginConfig,
    login_form_selector: String,
    state: SessionState<B::Page>,
    authentications: usize,
}

impl<B: PortalBrowser> Session<B> {
    pub fn new(browser: B, login: LoginConfig, login_form_selector: impl Into<String>) -> Self {
        Self {
            browser,
            login,
            login_form_selector: login_form_selector.into(),
            state: SessionState::Anonymous,
            authentications: 0,
        }
    }

    pub fn state(&self) -> &SessionState<B::Page> {
        &self.state
    }

    /// Number of logins performed; never more than one.
    pub fn authentications(&self) -> usize {
        self.authentications
    }

    /// Open a page for `url`, logging in first if the portal asks for it.
    ///
    /// Owned pages in the returned lease are closed when it is dropped. The
    /// primary page is only ever borrowed.
    pub async fn acquire_page(&mut self, url: &str) -> Result<PageLease<'_, B::Page>, AcquireError> {
        let page = OwnedPage::new(self.browser.open_page().await?);
        page.navigate(url).await?;

        if !page.is_visible(&self.login_form_selector).await? {
            return Ok(PageLease::Owned(page));
        }

        let just_authenticated = !self.state.is_authenticated();
        if just_authenticated {
            info!("Login form detected, authenticating");
            if let Err(e) = authenticate(&*page, &self.login).await {
                // Dropping the guard closes the page
                return Err(AcquireError::Fatal(VerifyError::Authentication(format!("{:#}", e))));
            }
            self.authentications += 1;
            if let Some(primary) = page.into_inner() {
                self.state = SessionState::Authenticated { primary };
            }
        } else {
            debug!("Login form shown again, reusing the authenticated page for {}", url);
            drop(page);
        }

        match &self.state {
            SessionState::Authenticated { primary } => {
                // The page that just logged in is used where the login left it
                if !just_authenticated {
                    primary.navigate(url).await?;
                }
                Ok(PageLease::Primary(primary))
            }
            SessionState::Anonymous => Err(AcquireError::Fatal(VerifyError::Authentication(
                "no authenticated page available".to_string(),
            ))),
        }
    }

    /// Close the primary page, if any, and return to the anonymous state.
    pub fn close(&mut self) {
        if let SessionState::Authenticated { primary } =
            std::mem::replace(&mut self.state, SessionState::Anonymous)
        {
            if let Err(e) = primary.close() {
                warn!("Failed to close primary page: {}", e);
            }
        }
    }
}

impl<B: PortalBrowser> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fill and submit the login form on `page`.
pub async fn authenticate<P: PortalPage>(page: &P, login: &LoginConfig) -> anyhow::Result<()> {
    page.fill(&login.username_selector, &login.username).await?;
    page.fill(&login.password_selector, &login.password).await?;
    page
        .wait_for(&login.location_selector, login.dependent_control_timeout())
        .await?;
    page.select_option(&login.facility_selector, &login.facility_code).await?;
    page.select_option(&login.location_selector, &login.location_code).await?;
    page.click(&login.submit_selector).await?;
    page.wait_until_navigated().await?;
    info!("Logged in to portal");
    Ok(())
}
