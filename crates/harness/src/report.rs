//! Structured verification results

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::diagnostics::{DiagnosticEvent, DiagnosticLog};
use crate::engine::RunState;
use crate::error::{HarnessError, HarnessResult};

/// Outcome of one verification run. Built once by [`Reporter`], read-only after.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    scenario: String,
    initial_count: usize,
    total_count: usize,
    update_count: usize,
    success: bool,
    screenshots: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    states: Vec<RunState>,
    #[serde(default)]
    events: Vec<DiagnosticEvent>,
    #[serde(default)]
    page_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    process_stderr: Option<String>,
    duration_ms: u64,
}

impl VerificationResult {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn initial_count(&self) -> usize {
        self.initial_count
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn screenshots(&self) -> &[PathBuf] {
        &self.screenshots
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn page_errors(&self) -> &[String] {
        &self.page_errors
    }

    pub fn page_snippet(&self) -> Option<&str> {
        self.page_snippet.as_deref()
    }

    pub fn process_stderr(&self) -> Option<&str> {
        self.process_stderr.as_deref()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// `initial=1 total=2 updates=1 success=true`
    pub fn summary(&self) -> String {
        format!(
            "initial={} total={} updates={} success={}",
            self.initial_count, self.total_count, self.update_count, self.success
        )
    }

    /// Write the result as pretty JSON to `<dir>/result.json`
    pub fn write_json(&self, dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("result.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Result written to: {}", path.display());
        Ok(path)
    }
}

/// Accumulates counts, states and evidence while a run progresses
#[derive(Debug)]
pub struct Reporter {
    scenario: String,
    started: Instant,
    initial_count: usize,
    total_count: usize,
    update_count: usize,
    screenshots: Vec<PathBuf>,
    warnings: Vec<String>,
    states: Vec<RunState>,
}

impl Reporter {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            started: Instant::now(),
            initial_count: 0,
            total_count: 0,
            update_count: 0,
            screenshots: Vec::new(),
            warnings: Vec::new(),
            states: Vec::new(),
        }
    }

    pub fn record_state(&mut self, state: RunState) {
        self.states.push(state);
    }

    pub fn record_initial(&mut self, count: usize) {
        self.initial_count = count;
        self.total_count = count;
    }

    pub fn record_final(&mut self, total: usize, updates: usize) {
        self.total_count = total;
        self.update_count = updates;
    }

    pub fn record_screenshot(&mut self, path: PathBuf) {
        self.screenshots.push(path);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    /// Build the final result. `cause` is the fatal error, if the run failed.
    pub fn finish(
        self,
        cause: Option<&HarnessError>,
        log: Option<&DiagnosticLog>,
        process_stderr: Option<String>,
    ) -> VerificationResult {
        let page_snippet = match cause {
            Some(HarnessError::EventTimeout { page_snippet, .. }) => page_snippet.clone(),
            _ => None,
        };

        VerificationResult {
            scenario: self.scenario,
            initial_count: self.initial_count,
            total_count: self.total_count,
            update_count: self.update_count,
            success: cause.is_none(),
            screenshots: self.screenshots,
            error: cause.map(|e| e.to_string()),
            error_kind: cause.map(|e| e.kind().to_string()),
            warnings: self.warnings,
            states: self.states,
            events: log.map(|l| l.snapshot()).unwrap_or_default(),
            page_errors: log.map(|l| l.page_errors()).unwrap_or_default(),
            page_snippet,
            process_stderr: process_stderr.filter(|s| !s.trim().is_empty()),
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
