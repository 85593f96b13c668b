//! Declarative YAML verification scenarios

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::WaitState;
use crate::diagnostics::{MatchMode, Marker};
use crate::error::{HarnessError, HarnessResult};

/// One verification scenario: where to go, which markers to watch, and
/// what stimulus (if any) to apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Route relative to the target's base URL
    pub route: String,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Selectors that must reach their state after navigation
    #[serde(default)]
    pub wait_for: Vec<SelectorWait>,

    #[serde(default)]
    pub markers: MarkerNames,

    /// Wait for the first creation marker after navigation
    #[serde(default)]
    pub initial_wait: Option<PollBudget>,

    /// Settle delay for rendering work no marker reports
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Stimulus applied after settling
    #[serde(default)]
    pub interaction: Option<Interaction>,

    #[serde(default)]
    pub post_wait: PostWait,

    #[serde(default)]
    pub screenshots: Screenshots,
}

fn default_navigation_timeout() -> u64 {
    60_000
}

fn default_settle() -> u64 {
    2000
}

/// A selector wait, either a bare selector string or a full mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorWait {
    Selector(String),
    Detailed {
        selector: String,
        #[serde(default)]
        state: WaitState,
    },
}

impl SelectorWait {
    pub fn selector(&self) -> &str {
        match self {
            SelectorWait::Selector(selector) | SelectorWait::Detailed { selector, .. } => selector,
        }
    }

    pub fn state(&self) -> WaitState {
        match self {
            SelectorWait::Selector(_) => WaitState::Visible,
            SelectorWait::Detailed { state, .. } => *state,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerNames {
    /// Emitted each time a chart is created; counted as initial/total
    #[serde(default)]
    pub created: Option<String>,

    /// Emitted each time chart data is updated
    #[serde(default)]
    pub updated: Option<String>,

    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
}

impl MarkerNames {
    pub fn created(&self) -> Option<Marker> {
        self.created.as_ref().map(|name| Marker::new(name.clone(), self.match_mode))
    }

    pub fn updated(&self) -> Option<Marker> {
        self.updated.as_ref().map(|name| Marker::new(name.clone(), self.match_mode))
    }
}

/// How a missed expectation is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fail the run
    #[default]
    Required,
    /// Record a warning and continue
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollBudget {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Upper bound on creation markers counted once the page has settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    #[serde(default)]
    pub severity: Severity,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            interval_ms: default_poll_interval(),
            max_count: None,
            severity: Severity::Required,
        }
    }
}

impl PollBudget {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_iterations() -> u32 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

/// Click a control found by accessible role and name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default = "default_role")]
    pub role: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub exact: bool,
    #[serde(default = "default_interaction_timeout")]
    pub timeout_ms: u64,
}

impl Interaction {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_role() -> String {
    "button".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interaction_timeout() -> u64 {
    5000
}

/// Expected marker deltas after the interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWait {
    #[serde(default = "default_post_window")]
    pub window_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_one")]
    pub min_new_created: usize,
    #[serde(default)]
    pub max_new_created: Option<usize>,
    #[serde(default = "default_one")]
    pub min_updates: usize,
    #[serde(default)]
    pub severity: Severity,
}

impl Default for PostWait {
    fn default() -> Self {
        Self {
            window_ms: default_post_window(),
            interval_ms: default_poll_interval(),
            min_new_created: 1,
            max_new_created: None,
            min_updates: 1,
            severity: Severity::Required,
        }
    }
}

impl PostWait {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_post_window() -> u64 {
    3000
}

fn default_one() -> usize {
    1
}

/// Screenshot paths, relative to the artifact directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshots {
    #[serde(default = "default_success_shot")]
    pub success: PathBuf,
    #[serde(default = "default_failure_shot")]
    pub failure: PathBuf,
    #[serde(default)]
    pub full_page: bool,
}

impl Default for Screenshots {
    fn default() -> Self {
        Self {
            success: default_success_shot(),
            failure: default_failure_shot(),
            full_page: false,
        }
    }
}

fn default_success_shot() -> PathBuf {
    PathBuf::from("chart.png")
}

fn default_failure_shot() -> PathBuf {
    PathBuf::from("chart_error.png")
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            HarnessError::Config(msg) => {
                HarnessError::Config(format!("{}: {}", path.display(), msg))
            }
            HarnessError::Yaml(e) => HarnessError::Config(format!("{}: {}", path.display(), e)),
            other => other,
        })
    }

    /// Load every scenario under a directory
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::Config("scenario name must not be empty".into()));
        }
        if !self.route.starts_with('/') {
            return Err(HarnessError::Config(format!(
                "route '{}' must start with '/'",
                self.route
            )));
        }
        if self.initial_wait.is_some() && self.markers.created.is_none() {
            return Err(HarnessError::Config(
                "initial_wait requires markers.created".into(),
            ));
        }
        if let Some(budget) = &self.initial_wait {
            if budget.iterations == 0 {
                return Err(HarnessError::Config(
                    "initial_wait.iterations must be at least 1".into(),
                ));
            }
            if budget.max_count == Some(0) {
                return Err(HarnessError::Config(
                    "initial_wait.max_count must be at least 1".into(),
                ));
            }
        }
        if let Some(interaction) = &self.interaction {
            if interaction.name.trim().is_empty() {
                return Err(HarnessError::Config("interaction.name must not be empty".into()));
            }
            if self.post_wait.interval_ms == 0 {
                return Err(HarnessError::Config(
                    "post_wait.interval_ms must be non-zero".into(),
                ));
            }
            if self.post_wait.min_new_created > 0 && self.markers.created.is_none() {
                return Err(HarnessError::Config(
                    "post_wait.min_new_created requires markers.created".into(),
                ));
            }
            if self.post_wait.min_updates > 0 && self.markers.updated.is_none() {
                return Err(HarnessError::Config(
                    "post_wait.min_updates requires markers.updated".into(),
                ));
            }
            if let Some(max) = self.post_wait.max_new_created {
                if max < self.post_wait.min_new_created {
                    return Err(HarnessError::Config(format!(
                        "post_wait.max_new_created ({}) is below min_new_created ({})",
                        max, self.post_wait.min_new_created
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Full URL of the route under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.route)
    }
}
