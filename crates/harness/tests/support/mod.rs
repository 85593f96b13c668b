//! Scripted stand-in for a real browser.
//!
//! `ScriptedLauncher` hands out drivers that emit console markers on a timer
//! after navigation and after a click, the way the dashboard does once its
//! chart pipeline has run. Tests use paused tokio time, so the delays cost
//! nothing.

#![allow(dead_code)]

use async_trait::async_trait;
use chartcheck_harness::browser::{BrowserLauncher, PageDriver, WaitState};
use chartcheck_harness::diagnostics::DiagnosticLog;
use chartcheck_harness::error::{HarnessError, HarnessResult};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A console line emitted `after` a trigger
#[derive(Debug, Clone)]
pub struct Emit {
    pub after: Duration,
    pub text: String,
    pub page_error: bool,
}

pub fn console(after_ms: u64, text: &str) -> Emit {
    Emit {
        after: Duration::from_millis(after_ms),
        text: text.to_string(),
        page_error: false,
    }
}

pub fn page_error(after_ms: u64, text: &str) -> Emit {
    Emit {
        after: Duration::from_millis(after_ms),
        text: text.to_string(),
        page_error: true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub on_goto: Vec<Emit>,
    pub on_click: Vec<Emit>,
    pub fail_goto: bool,
    pub fail_click: bool,
    pub fail_screenshot: bool,
    pub fail_subscribe: bool,
    /// Selectors that never appear
    pub missing: Vec<String>,
    pub content: String,
}

impl Script {
    /// One chart creation after load and one more plus an update after the click
    pub fn healthy() -> Self {
        Self {
            on_goto: vec![console(300, "CHART_CREATED")],
            on_click: vec![console(200, "CHART_CREATED"), console(400, "DATA_UPDATED")],
            content: "<html><body><div id=\"chart\"></div></body></html>".into(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct ScriptedLauncher {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every driver call in order, e.g. `["subscribe", "goto http://..."]`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.lock().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> HarnessResult<Box<dyn PageDriver>> {
        self.calls.lock().push("launch".into());
        Ok(Box::new(ScriptedDriver {
            script: self.script.clone(),
            calls: self.calls.clone(),
            log: None,
        }))
    }
}

struct ScriptedDriver {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
    log: Option<DiagnosticLog>,
}

impl ScriptedDriver {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    /// Events emitted before anyone subscribed are lost, as on a real page
    fn emit(&self, events: &[Emit]) {
        let Some(log) = self.log.clone() else { return };
        for event in events.iter().cloned() {
            let log = log.clone();
            tokio::spawn(async move {
                tokio::time::sleep(event.after).await;
                if event.page_error {
                    log.page_error(event.text);
                } else {
                    log.console(event.text);
                }
            });
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn subscribe(&mut self, log: DiagnosticLog) -> HarnessResult<()> {
        self.record("subscribe".into());
        if self.script.fail_subscribe {
            return Err(HarnessError::Driver("listener registration failed".into()));
        }
        self.log = Some(log);
        Ok(())
    }

    async fn goto(&mut self, url: &str, _timeout: Duration) -> HarnessResult<()> {
        self.record(format!("goto {}", url));
        if self.script.fail_goto {
            return Err(HarnessError::Driver("net::ERR_CONNECTION_REFUSED".into()));
        }
        let events = self.script.on_goto.clone();
        self.emit(&events);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.record(format!("wait {} {}", selector, state.as_str()));
        if self.script.missing.iter().any(|m| m == selector) {
            tokio::time::sleep(timeout).await;
            return Err(HarnessError::Driver(format!(
                "Timeout {}ms exceeded waiting for {}",
                timeout.as_millis(),
                selector
            )));
        }
        Ok(())
    }

    async fn click_by_role(
        &mut self,
        role: &str,
        name: &str,
        exact: bool,
        _timeout: Duration,
    ) -> HarnessResult<()> {
        self.record(format!("click {} {} exact={}", role, name, exact));
        if self.script.fail_click {
            return Err(HarnessError::Driver(format!(
                "no {} named '{}' on the page",
                role, name
            )));
        }
        let events = self.script.on_click.clone();
        self.emit(&events);
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()> {
        self.record(format!("screenshot {} full_page={}", path.display(), full_page));
        if self.script.fail_screenshot {
            return Err(HarnessError::Driver("page crashed".into()));
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        Ok(())
    }

    async fn content(&mut self) -> HarnessResult<String> {
        self.record("content".into());
        Ok(self.script.content.clone())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.record("close".into());
        Ok(())
    }
}
