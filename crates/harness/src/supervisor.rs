//! Target process supervision - spawning the application in its own process
//! group and tearing the whole group down again

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ProcessConfig;
use crate::error::{HarnessError, HarnessResult};

/// Bytes of output retained per stream
const OUTPUT_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Starting,
    Ready,
    Running,
    Terminated,
}

impl ProcessState {
    fn can_advance_to(self, next: ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::Starting, ProcessState::Ready)
                | (ProcessState::Ready, ProcessState::Running)
                | (ProcessState::Starting, ProcessState::Terminated)
                | (ProcessState::Ready, ProcessState::Terminated)
                | (ProcessState::Running, ProcessState::Terminated)
        )
    }
}

/// Tail of a captured output stream, shared with its drain task
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn push_line(&self, line: &str) {
        let mut buf = self.inner.lock();
        buf.push_str(line);
        buf.push('\n');

        if buf.len() > OUTPUT_LIMIT {
            let mut cut = buf.len() - OUTPUT_LIMIT;
            while !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
        }
    }

    pub fn snapshot(&self) -> String {
        self.inner.lock().clone()
    }
}

/// A running target application, leader of its own process group.
///
/// Dropping a process that was never stopped kills the whole group.
pub struct TargetProcess {
    child: Child,
    pid: u32,
    pgid: Pid,
    state: ProcessState,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    grace_period: Duration,
    drains: Vec<JoinHandle<()>>,
}

impl TargetProcess {
    /// Spawn the target in a fresh process group. Returns without waiting for
    /// the application to accept connections.
    pub fn start(config: &ProcessConfig) -> HarnessResult<Self> {
        info!("Starting target: {} {}", config.command, config.args.join(" "));

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| HarnessError::Startup {
            reason: format!("failed to spawn {}: {}", config.command, e),
            stderr: String::new(),
        })?;

        let pid = child.id().ok_or_else(|| HarnessError::Startup {
            reason: "process exited before its pid could be read".into(),
            stderr: String::new(),
        })?;

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let mut drains = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            drains.push(drain(out, stdout.clone(), "stdout"));
        }
        if let Some(err) = child.stderr.take() {
            drains.push(drain(err, stderr.clone(), "stderr"));
        }

        info!("Target started (pid: {}, pgid: {})", pid, pid);

        Ok(Self {
            child,
            pid,
            pgid: Pid::from_raw(pid as i32),
            state: ProcessState::Starting,
            stdout,
            stderr,
            grace_period: config.grace_period(),
            drains,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn pgid(&self) -> i32 {
        self.pgid.as_raw()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn stdout(&self) -> String {
        self.stdout.snapshot()
    }

    pub fn stderr(&self) -> String {
        self.stderr.snapshot()
    }

    pub fn mark_ready(&mut self) -> HarnessResult<()> {
        self.advance(ProcessState::Ready)
    }

    pub fn mark_running(&mut self) -> HarnessResult<()> {
        self.advance(ProcessState::Running)
    }

    fn advance(&mut self, next: ProcessState) -> HarnessResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(HarnessError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", next),
            });
        }
        debug!("Target {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Exit status if the group leader has already exited
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Terminate the whole process group and wait for the leader.
    ///
    /// Calling this on an already terminated process is a no-op.
    pub async fn stop(&mut self) -> HarnessResult<()> {
        if self.state == ProcessState::Terminated {
            debug!("Target (pgid: {}) already terminated", self.pgid);
            return Ok(());
        }

        info!("Stopping target process group (pgid: {})", self.pgid);
        let result = self.terminate_group().await;
        self.state = ProcessState::Terminated;

        // Pipes close once every member is gone
        for handle in self.drains.drain(..) {
            let _ = timeout(Duration::from_secs(1), handle).await;
        }

        result
    }

    async fn terminate_group(&mut self) -> HarnessResult<()> {
        match killpg(self.pgid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                debug!("Process group {} no longer exists", self.pgid);
                let _ = self.child.try_wait();
                return Ok(());
            }
            Err(e) => {
                warn!("SIGTERM to process group {} failed: {}", self.pgid, e);
            }
        }

        match timeout(self.grace_period, self.child.wait()).await {
            Ok(Ok(status)) => info!("Target exited: {}", status),
            Ok(Err(e)) => return Err(HarnessError::Io(e)),
            Err(_) => {
                warn!(
                    "Target did not exit within {:?}, sending SIGKILL",
                    self.grace_period
                );
                let _ = killpg(self.pgid, Signal::SIGKILL);
                let status = self.child.wait().await?;
                info!("Target killed: {}", status);
            }
        }

        // Sweep members that ignored SIGTERM after the leader went away
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) => debug!("Swept remaining members of process group {}", self.pgid),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("SIGKILL sweep of process group {} failed: {}", self.pgid, e),
        }

        Ok(())
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        if self.state != ProcessState::Terminated {
            warn!(
                "Target process group {} dropped without stop, killing it",
                self.pgid
            );
            let _ = killpg(self.pgid, Signal::SIGKILL);
            let _ = self.child.start_kill();
            self.state = ProcessState::Terminated;
        }
    }
}

pub(crate) fn drain<R>(reader: R, buffer: OutputBuffer, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end_matches(['\r', '\n']);
                    debug!(target: "chartcheck::target", "[{}] {}", stream, text);
                    buffer.push_line(text);
                }
                Err(e) => {
                    debug!("Stopped reading target {}: {}", stream, e);
                    break;
                }
            }
        }
    })
}

/// Kill whatever process currently listens on `port`.
///
/// Uses `lsof`; every failure is logged and otherwise ignored. Returns the
/// number of processes signalled.
pub fn reclaim_port(port: u16) -> usize {
    let output = match std::process::Command::new("lsof")
        .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Cannot reclaim port {} (lsof unavailable: {})", port, e);
            return 0;
        }
    };

    let own_pid = std::process::id() as i32;
    let mut signalled = 0;
    for pid in parse_pids(&String::from_utf8_lossy(&output.stdout)) {
        if pid == own_pid {
            continue;
        }
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                info!("Sent SIGTERM to pid {} holding port {}", pid, port);
                signalled += 1;
            }
            Err(e) => warn!("Failed to signal pid {} on port {}: {}", pid, port, e),
        }
    }
    signalled
}

fn parse_pids(output: &str) -> Vec<i32> {
    let mut pids: Vec<i32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .filter(|pid| *pid > 0)
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}
