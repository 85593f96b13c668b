//! Error types for verification runs

use std::path::PathBuf;
use thiserror::Error;

use crate::report::VerificationResult;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Target failed to start: {reason}")]
    Startup {
        reason: String,
        /// Captured stderr of the target process
        stderr: String,
    },

    #[error("Target not reachable at {host}:{port} after {attempts} attempts")]
    StartupTimeout {
        host: String,
        port: u16,
        attempts: u32,
        stderr: String,
    },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Marker '{marker}' not observed {phase} ({observed} seen after {polls} polls)")]
    EventTimeout {
        marker: String,
        phase: String,
        polls: u32,
        observed: usize,
        /// Full diagnostic log at the time of the timeout
        log: Vec<String>,
        page_snippet: Option<String>,
    },

    #[error("Interaction with {role} '{name}' failed: {reason}")]
    Interaction {
        role: String,
        name: String,
        reason: String,
    },

    #[error("Screenshot {} could not be written: {reason}", path.display())]
    Capture { path: PathBuf, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Node.js not found at '{0}'. Install Node.js and run: npm install playwright")]
    NodeNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HarnessError {
    /// Stable taxonomy name reported as `errorKind`
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Startup { .. } | HarnessError::StartupTimeout { .. } => "StartupError",
            HarnessError::Navigation { .. } => "NavigationError",
            HarnessError::EventTimeout { .. } => "EventTimeoutError",
            HarnessError::Interaction { .. } => "InteractionError",
            HarnessError::Capture { .. } => "CaptureError",
            HarnessError::AssertionFailed(_) => "AssertionError",
            HarnessError::Driver(_) | HarnessError::NodeNotFound(_) => "DriverError",
            HarnessError::Config(_)
            | HarnessError::Yaml(_)
            | HarnessError::Toml(_) => "ConfigError",
            HarnessError::InvalidStateTransition { .. } => "StateError",
            HarnessError::Io(_) | HarnessError::Json(_) => "IoError",
        }
    }

    /// Captured stderr of the target process, if this error carries it
    pub fn target_stderr(&self) -> Option<&str> {
        match self {
            HarnessError::Startup { stderr, .. } | HarnessError::StartupTimeout { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// A failed run: the original fatal cause plus everything gathered before it
#[derive(Error, Debug)]
#[error("{cause}")]
pub struct RunFailure {
    #[source]
    pub cause: HarnessError,
    pub result: VerificationResult,
}
