//! Harness configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Top-level harness configuration, usually loaded from `chartcheck.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory screenshots and `result.json` are written to
    pub artifact_dir: PathBuf,

    /// Target application process
    pub process: ProcessConfig,

    /// Readiness probe budget
    pub readiness: ReadinessConfig,

    /// Browser driver options
    pub browser: BrowserConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("verification"),
            process: ProcessConfig::default(),
            readiness: ReadinessConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.process.command.trim().is_empty() {
            return Err(HarnessError::Config("process.command must not be empty".into()));
        }
        if self.readiness.port == 0 {
            return Err(HarnessError::Config("readiness.port must be non-zero".into()));
        }
        if self.readiness.max_retries == 0 {
            return Err(HarnessError::Config("readiness.max_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Base URL the browser navigates against
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.readiness.host, self.readiness.port)
    }
}

/// How to launch the target application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,

    /// Working directory (None = inherit)
    pub cwd: Option<PathBuf>,

    /// Extra environment on top of the inherited one
    pub env: BTreeMap<String, String>,

    /// Time between SIGTERM and SIGKILL during stop
    pub grace_period_ms: u64,

    /// Kill whatever already listens on the readiness port before starting
    pub reclaim_port: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
            args: vec!["start".to_string()],
            cwd: None,
            env: BTreeMap::new(),
            grace_period_ms: 10_000,
            reclaim_port: false,
        }
    }
}

impl ProcessConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub interval_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            max_retries: 60,
            interval_ms: 2000,
            connect_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" => Ok(BrowserEngine::Webkit),
            other => Err(HarnessError::Config(format!("unknown browser engine '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node.js executable used to host the Playwright driver
    pub node_binary: PathBuf,

    /// Directory whose `node_modules` provides `playwright`
    pub node_project_dir: PathBuf,

    /// Extra time granted to a driver reply beyond the command's own timeout
    pub command_slack_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_project_dir: PathBuf::from("."),
            command_slack_ms: 5000,
        }
    }
}
