//! Playwright browser automation over a line-delimited JSON protocol
//!
//! A small Node.js driver (`driver.js`) owns the Playwright browser. Commands
//! are written to its stdin as `{id, op, ...}` lines; replies
//! (`{id, ok, data?, error?}`) and page events (`{event, level?, text}`) come
//! back on stdout. A reader task routes events into the session's
//! [`DiagnosticLog`] and replies back to the waiting caller.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{BrowserLauncher, PageDriver, WaitState};
use crate::config::BrowserConfig;
use crate::diagnostics::{DiagnosticLog, EventSource};
use crate::error::{HarnessError, HarnessResult};
use crate::supervisor::{drain, OutputBuffer};

const DRIVER_SCRIPT: &str = include_str!("driver.js");

/// Time allowed for launching the browser and opening the page
const LAUNCH_BUDGET: Duration = Duration::from_secs(60);
const SCREENSHOT_BUDGET: Duration = Duration::from_secs(30);
const QUICK_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Open {
        browser: &'a str,
        headless: bool,
        viewport: Viewport,
    },
    Subscribe,
    Goto {
        url: &'a str,
        timeout_ms: u64,
    },
    WaitForSelector {
        selector: &'a str,
        state: &'a str,
        timeout_ms: u64,
    },
    ClickRole {
        role: &'a str,
        name: &'a str,
        exact: bool,
        timeout_ms: u64,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    Content,
    Close,
}

impl DriverCommand<'_> {
    fn op(&self) -> &'static str {
        match self {
            DriverCommand::Open { .. } => "open",
            DriverCommand::Subscribe => "subscribe",
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::WaitForSelector { .. } => "wait_for_selector",
            DriverCommand::ClickRole { .. } => "click_role",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::Content => "content",
            DriverCommand::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: DriverCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct PageEvent {
    event: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DriverMessage {
    Event(PageEvent),
    Reply(Reply),
}

type EventSink = Arc<Mutex<Option<DiagnosticLog>>>;

/// Launches one Playwright driver per session
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: BrowserConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self) -> HarnessResult<Box<dyn PageDriver>> {
        let driver = PlaywrightDriver::spawn(&self.config).await?;
        Ok(Box::new(driver))
    }
}

/// A running Node.js Playwright driver controlling one page
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    replies: mpsc::UnboundedReceiver<Reply>,
    sink: EventSink,
    stderr: OutputBuffer,
    next_id: u64,
    slack: Duration,
    closed: bool,
    reader: JoinHandle<()>,
    // Holds driver.js for the lifetime of the process
    _workdir: TempDir,
}

impl PlaywrightDriver {
    /// Start the driver and open a browser with a single page
    pub async fn spawn(config: &BrowserConfig) -> HarnessResult<Self> {
        check_node_installed(&config.node_binary)?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .current_dir(&config.node_project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Driver(format!("failed to start driver: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Driver("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Driver("driver stdout unavailable".into()))?;

        let stderr = OutputBuffer::default();
        if let Some(err) = child.stderr.take() {
            drain(err, stderr.clone(), "driver");
        }

        let sink: EventSink = Arc::new(Mutex::new(None));
        let (tx, replies) = mpsc::unbounded_channel();
        let reader = spawn_reader(stdout, sink.clone(), tx);

        let mut driver = Self {
            child,
            stdin,
            replies,
            sink,
            stderr,
            next_id: 0,
            slack: Duration::from_millis(config.command_slack_ms),
            closed: false,
            reader,
            _workdir: workdir,
        };

        driver
            .call(
                DriverCommand::Open {
                    browser: config.engine.as_str(),
                    headless: config.headless,
                    viewport: Viewport {
                        width: config.viewport_width,
                        height: config.viewport_height,
                    },
                },
                LAUNCH_BUDGET,
            )
            .await?;

        info!(
            "Browser ready ({}, headless: {})",
            config.engine.as_str(),
            config.headless
        );
        Ok(driver)
    }

    async fn call(
        &mut self,
        command: DriverCommand<'_>,
        budget: Duration,
    ) -> HarnessResult<serde_json::Value> {
        if self.closed {
            return Err(HarnessError::Driver("driver is closed".into()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let op = command.op();

        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');
        debug!(target: "chartcheck::driver", "-> {}", line.trim_end());

        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            return Err(self.gone(&format!("write of '{}' failed: {}", op, e)));
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(self.gone(&format!("flush of '{}' failed: {}", op, e)));
        }

        let deadline = budget + self.slack;
        let waited = timeout(deadline, next_reply(&mut self.replies, id)).await;
        let reply = match waited {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(self.gone(&format!("no reply to '{}'", op))),
            Err(_) => {
                return Err(HarnessError::Driver(format!(
                    "no reply to '{}' within {:?}",
                    op, deadline
                )))
            }
        };

        if reply.ok {
            Ok(reply.data)
        } else {
            Err(HarnessError::Driver(
                reply.error.unwrap_or_else(|| format!("'{}' failed", op)),
            ))
        }
    }

    fn gone(&self, context: &str) -> HarnessError {
        let stderr = self.stderr.snapshot();
        HarnessError::Driver(format!(
            "driver exited unexpectedly ({}): {}",
            context,
            stderr.trim()
        ))
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn subscribe(&mut self, log: DiagnosticLog) -> HarnessResult<()> {
        // The sink must be in place before the driver starts emitting
        *self.sink.lock() = Some(log);
        self.call(DriverCommand::Subscribe, QUICK_BUDGET).await?;
        Ok(())
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> HarnessResult<()> {
        self.call(
            DriverCommand::Goto {
                url,
                timeout_ms: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.call(
            DriverCommand::WaitForSelector {
                selector,
                state: state.as_str(),
                timeout_ms: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn click_by_role(
        &mut self,
        role: &str,
        name: &str,
        exact: bool,
        timeout: Duration,
    ) -> HarnessResult<()> {
        self.call(
            DriverCommand::ClickRole {
                role,
                name,
                exact,
                timeout_ms: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()> {
        // The driver runs in the node project directory
        let path = absolute(path)?;
        self.call(
            DriverCommand::Screenshot {
                path: path.to_string_lossy().to_string(),
                full_page,
            },
            SCREENSHOT_BUDGET,
        )
        .await?;
        Ok(())
    }

    async fn content(&mut self) -> HarnessResult<String> {
        let data = self.call(DriverCommand::Content, QUICK_BUDGET).await?;
        Ok(data
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if self.closed {
            return Ok(());
        }

        let result = self.call(DriverCommand::Close, QUICK_BUDGET).await;
        self.closed = true;

        match timeout(QUICK_BUDGET, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Driver exited: {}", status),
            Ok(Err(e)) => warn!("Waiting for driver failed: {}", e),
            Err(_) => {
                warn!("Driver did not exit after close, killing it");
                let _ = self.child.kill().await;
            }
        }
        self.reader.abort();

        result.map(|_| ())
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.start_kill();
        }
        self.reader.abort();
    }
}

fn check_node_installed(node: &Path) -> HarnessResult<()> {
    let status = std::process::Command::new(node)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(HarnessError::NodeNotFound(node.display().to_string())),
    }
}

fn absolute(path: &Path) -> HarnessResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn next_reply(replies: &mut mpsc::UnboundedReceiver<Reply>, id: u64) -> Option<Reply> {
    while let Some(reply) = replies.recv().await {
        if reply.id == id {
            return Some(reply);
        }
        debug!("Discarding stale driver reply {}", reply.id);
    }
    None
}

fn spawn_reader(
    stdout: ChildStdout,
    sink: EventSink,
    replies: mpsc::UnboundedSender<Reply>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!("Driver stdout closed: {}", e);
                    break;
                }
            };

            match serde_json::from_str::<DriverMessage>(&line) {
                Ok(DriverMessage::Event(event)) => route_event(&sink, event),
                Ok(DriverMessage::Reply(reply)) => {
                    debug!(target: "chartcheck::driver", "<- reply {} ok={}", reply.id, reply.ok);
                    if replies.send(reply).is_err() {
                        break;
                    }
                }
                Err(_) => debug!(target: "chartcheck::driver", "{}", line),
            }
        }
    })
}

fn route_event(sink: &EventSink, event: PageEvent) {
    let guard = sink.lock();
    let Some(log) = guard.as_ref() else {
        debug!("Dropping '{}' event received before subscription", event.event);
        return;
    };

    match event.event.as_str() {
        "console" => {
            debug!(target: "chartcheck::page", "console: {}", event.text);
            log.append(EventSource::Console, event.level, event.text);
        }
        "pageerror" => {
            warn!("Page error: {}", event.text);
            log.append(EventSource::PageError, None, event.text);
        }
        other => debug!("Ignoring unknown driver event '{}'", other),
    }
}
