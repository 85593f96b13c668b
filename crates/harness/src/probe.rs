//! Readiness probing - waiting for the target to accept TCP connections

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::supervisor::TargetProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProbeOutcome::Ready { attempts } | ProbeOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// A bounded-retry TCP reachability check
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub interval: Duration,
    pub connect_timeout: Duration,
}

impl From<&ReadinessConfig> for ReadinessCheck {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            max_retries: config.max_retries,
            interval: Duration::from_millis(config.interval_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}

impl ReadinessCheck {
    pub fn new(host: impl Into<String>, port: u16, max_retries: u32, interval: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            max_retries,
            interval,
            connect_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Poll until a connection succeeds or the retry budget is spent
    pub async fn run(&self) -> ProbeOutcome {
        info!("Waiting for {}:{} to accept connections...", self.host, self.port);

        for attempt in 1..=self.max_retries {
            if self.attempt().await {
                info!("{}:{} is ready (attempt {})", self.host, self.port, attempt);
                return ProbeOutcome::Ready { attempts: attempt };
            }
            if attempt < self.max_retries {
                sleep(self.interval).await;
            }
        }

        warn!(
            "{}:{} not reachable after {} attempts",
            self.host, self.port, self.max_retries
        );
        ProbeOutcome::TimedOut { attempts: self.max_retries }
    }

    /// Probe on behalf of a supervised process. Fails fast if the process
    /// exits, and turns an exhausted budget into a startup error carrying the
    /// process's stderr.
    pub async fn wait_for(&self, process: &mut TargetProcess) -> HarnessResult<ProbeOutcome> {
        info!("Waiting for {}:{} to accept connections...", self.host, self.port);

        for attempt in 1..=self.max_retries {
            if self.attempt().await {
                info!("{}:{} is ready (attempt {})", self.host, self.port, attempt);
                return Ok(ProbeOutcome::Ready { attempts: attempt });
            }

            if let Some(status) = process.try_exit_status() {
                return Err(HarnessError::Startup {
                    reason: format!("target exited before becoming reachable ({})", status),
                    stderr: process.stderr(),
                });
            }

            if attempt < self.max_retries {
                sleep(self.interval).await;
            }
        }

        Err(HarnessError::StartupTimeout {
            host: self.host.clone(),
            port: self.port,
            attempts: self.max_retries,
            stderr: process.stderr(),
        })
    }

    async fn attempt(&self) -> bool {
        let addr = format!("{}:{}", self.host, self.port);
        match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("Connect to {} timed out", addr);
                false
            }
        }
    }
}

/// Single reachability check, used after teardown to confirm the port is free
pub async fn is_listening(host: &str, port: u16, connect_timeout: Duration) -> bool {
    ReadinessCheck::new(host, port, 1, Duration::ZERO)
        .with_connect_timeout(connect_timeout)
        .attempt()
        .await
}
