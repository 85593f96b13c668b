//! Browser session management
//!
//! Browser control is reached through [`BrowserLauncher`] and [`PageDriver`].
//! A [`BrowserSession`] owns exactly one page and is only handed out after the
//! page's console and error streams are wired into its [`DiagnosticLog`], so
//! nothing can navigate before the subscriptions exist.

pub mod playwright;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticLog;
use crate::error::{HarnessError, HarnessResult};

pub use playwright::{PlaywrightDriver, PlaywrightLauncher};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Control over a single page in an isolated browser instance
#[async_trait]
pub trait PageDriver: Send {
    /// Route console output and uncaught page errors into `log`
    async fn subscribe(&mut self, log: DiagnosticLog) -> HarnessResult<()>;

    async fn goto(&mut self, url: &str, timeout: Duration) -> HarnessResult<()>;

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> HarnessResult<()>;

    /// Resolve a control by accessible role and name and click it
    async fn click_by_role(
        &mut self,
        role: &str,
        name: &str,
        exact: bool,
        timeout: Duration,
    ) -> HarnessResult<()>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()>;

    async fn content(&mut self) -> HarnessResult<String>;

    async fn close(&mut self) -> HarnessResult<()>;
}

/// Starts a fresh browser instance with one page
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> HarnessResult<Box<dyn PageDriver>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Open,
    Closed,
}

/// An open browser page with its diagnostic subscriptions installed
pub struct BrowserSession {
    driver: Box<dyn PageDriver>,
    log: DiagnosticLog,
    state: SessionState,
}

impl BrowserSession {
    /// Launch a browser, then subscribe to its page before returning
    pub async fn open(launcher: &dyn BrowserLauncher) -> HarnessResult<Self> {
        info!("Launching browser...");
        let mut driver = launcher.launch().await?;

        let log = DiagnosticLog::new();
        if let Err(e) = driver.subscribe(log.clone()).await {
            if let Err(close_err) = driver.close().await {
                warn!("Closing browser after failed subscribe: {}", close_err);
            }
            return Err(e);
        }
        debug!("Console and page error listeners installed");

        Ok(Self {
            driver,
            log,
            state: SessionState::Open,
        })
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn driver(&mut self) -> HarnessResult<&mut Box<dyn PageDriver>> {
        match self.state {
            SessionState::Open => Ok(&mut self.driver),
            SessionState::Closed => Err(HarnessError::Driver("browser session is closed".into())),
        }
    }

    pub async fn goto(&mut self, url: &str, timeout: Duration) -> HarnessResult<()> {
        self.driver()?.goto(url, timeout).await
    }

    pub async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.driver()?.wait_for_selector(selector, state, timeout).await
    }

    pub async fn click_by_role(
        &mut self,
        role: &str,
        name: &str,
        exact: bool,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.driver()?.click_by_role(role, name, exact, timeout).await
    }

    pub async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()> {
        self.driver()?.screenshot(path, full_page).await
    }

    pub async fn content(&mut self) -> HarnessResult<String> {
        self.driver()?.content().await
    }

    /// Close the browser. Closing an already closed session does nothing.
    pub async fn close(&mut self) -> HarnessResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        info!("Closing browser");
        self.driver.close().await
    }
}
