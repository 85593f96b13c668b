//! Navigation & assertion state machine
//!
//! ```text
//! NAVIGATING -> WAITING_INITIAL_EVENT -> STABILIZING -> [INTERACTING -> WAITING_POST_EVENT]
//!            -> CAPTURING -> DONE
//! ```
//!
//! Any non-terminal state fails through CAPTURING (failure screenshot) into
//! FAILED. Correctness of the asynchronous chart pipeline is inferred from the
//! change in marker counts between the pre-interaction baseline and the end of
//! the post-interaction window, never from a single absolute count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::browser::BrowserSession;
use crate::capture::capture;
use crate::diagnostics::Marker;
use crate::error::{HarnessError, HarnessResult};
use crate::report::Reporter;
use crate::scenario::{Interaction, Scenario, Severity};

/// Characters of page content attached to an initial marker timeout
const PAGE_SNIPPET_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Navigating,
    WaitingInitialEvent,
    Stabilizing,
    Interacting,
    WaitingPostEvent,
    Capturing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Navigating => "NAVIGATING",
            RunState::WaitingInitialEvent => "WAITING_INITIAL_EVENT",
            RunState::Stabilizing => "STABILIZING",
            RunState::Interacting => "INTERACTING",
            RunState::WaitingPostEvent => "WAITING_POST_EVENT",
            RunState::Capturing => "CAPTURING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Failed => true,
            Capturing => self != Capturing,
            Done => self == Capturing,
            _ => matches!(
                (self, next),
                (Navigating, WaitingInitialEvent)
                    | (WaitingInitialEvent, Stabilizing)
                    | (Stabilizing, Interacting)
                    | (Interacting, WaitingPostEvent)
            ),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one scenario against an open browser session
pub struct Engine<'a> {
    session: &'a mut BrowserSession,
    scenario: &'a Scenario,
    reporter: &'a mut Reporter,
    base_url: String,
    artifact_dir: PathBuf,
    state: RunState,
    /// Log position at the pre-interaction baseline
    baseline: usize,
}

impl<'a> Engine<'a> {
    pub fn new(
        session: &'a mut BrowserSession,
        scenario: &'a Scenario,
        reporter: &'a mut Reporter,
        base_url: impl Into<String>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        reporter.record_state(RunState::Navigating);
        Self {
            session,
            scenario,
            reporter,
            base_url: base_url.into(),
            artifact_dir: artifact_dir.into(),
            state: RunState::Navigating,
            baseline: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the scenario to DONE or FAILED. A screenshot is attempted on both
    /// paths; its outcome never changes the result.
    pub async fn run(mut self) -> HarnessResult<()> {
        let outcome = self.drive().await;

        let scenario = self.scenario;
        let shots = &scenario.screenshots;
        let shot = match &outcome {
            Ok(()) => &shots.success,
            Err(_) => &shots.failure,
        };
        let path = self.artifact_dir.join(shot);

        self.advance_or_log(RunState::Capturing);
        if let Some(saved) = capture(self.session, &path, shots.full_page).await {
            self.reporter.record_screenshot(saved);
        }

        match outcome {
            Ok(()) => {
                self.advance_or_log(RunState::Done);
                info!("Scenario '{}' passed", scenario.name);
                Ok(())
            }
            Err(e) => {
                self.advance_or_log(RunState::Failed);
                error!("Scenario '{}' failed: {}", scenario.name, e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> HarnessResult<()> {
        self.navigate().await?;

        self.advance(RunState::WaitingInitialEvent)?;
        self.wait_initial().await?;

        self.advance(RunState::Stabilizing)?;
        self.stabilize().await?;

        let scenario = self.scenario;
        match &scenario.interaction {
            Some(interaction) => {
                self.advance(RunState::Interacting)?;
                self.interact(interaction).await?;

                self.advance(RunState::WaitingPostEvent)?;
                self.wait_post().await
            }
            None => {
                let log = self.session.log();
                let total = self.created().map(|m| log.count(&m)).unwrap_or(0);
                let updates = self.updated().map(|m| log.count(&m)).unwrap_or(0);
                self.reporter.record_final(total, updates);
                Ok(())
            }
        }
    }

    fn advance(&mut self, next: RunState) -> HarnessResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarnessError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        info!("{} -> {}", self.state, next);
        self.state = next;
        self.reporter.record_state(next);
        Ok(())
    }

    fn advance_or_log(&mut self, next: RunState) {
        if let Err(e) = self.advance(next) {
            error!("{}", e);
        }
    }

    fn created(&self) -> Option<Marker> {
        self.scenario.markers.created()
    }

    fn updated(&self) -> Option<Marker> {
        self.scenario.markers.updated()
    }

    async fn navigate(&mut self) -> HarnessResult<()> {
        let scenario = self.scenario;
        let url = scenario.url(&self.base_url);
        let timeout = scenario.navigation_timeout();

        info!("Navigating to {}...", url);
        self.session
            .goto(&url, timeout)
            .await
            .map_err(|e| HarnessError::Navigation {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        for wait in &scenario.wait_for {
            info!("Waiting for '{}'...", wait.selector());
            self.session
                .wait_for_selector(wait.selector(), wait.state(), timeout)
                .await
                .map_err(|e| HarnessError::Navigation {
                    url: url.clone(),
                    reason: format!(
                        "'{}' never became {}: {}",
                        wait.selector(),
                        wait.state().as_str(),
                        e
                    ),
                })?;
        }
        Ok(())
    }

    async fn wait_initial(&mut self) -> HarnessResult<()> {
        let scenario = self.scenario;
        let (Some(budget), Some(marker)) = (&scenario.initial_wait, self.created()) else {
            debug!("No initial marker configured");
            return Ok(());
        };

        info!("Waiting for '{}'...", marker.name);
        for poll in 1..=budget.iterations {
            if self.session.log().count(&marker) > 0 {
                info!("Observed '{}' after {} poll(s)", marker.name, poll);
                return Ok(());
            }
            if poll < budget.iterations {
                sleep(budget.interval()).await;
            }
        }

        let log = self.session.log().texts();
        info!("Diagnostic log so far: {:?}", log);

        let page_snippet = match self.session.content().await {
            Ok(content) => Some(content.chars().take(PAGE_SNIPPET_LEN).collect()),
            Err(e) => {
                debug!("Page content unavailable: {}", e);
                None
            }
        };

        let err = HarnessError::EventTimeout {
            marker: marker.name.clone(),
            phase: "after navigation".to_string(),
            polls: budget.iterations,
            observed: 0,
            log,
            page_snippet,
        };
        self.judge(budget.severity, err)
    }

    async fn stabilize(&mut self) -> HarnessResult<()> {
        let settle = self.scenario.settle();
        if !settle.is_zero() {
            debug!("Settling for {:?}", settle);
            sleep(settle).await;
        }

        let created = self.created();
        let (baseline, initial) = self.session.log().checkpoint(created.as_ref());
        self.baseline = baseline;
        self.reporter.record_initial(initial);

        let Some(marker) = created else {
            return Ok(());
        };
        info!("Initial {} count: {}", marker.name, initial);

        let scenario = self.scenario;
        let Some(budget) = &scenario.initial_wait else {
            return Ok(());
        };
        match budget.max_count {
            Some(max) if initial > max => {
                let err = HarnessError::AssertionFailed(format!(
                    "expected at most {} '{}' after load, observed {}",
                    max, marker.name, initial
                ));
                self.judge(budget.severity, err)
            }
            _ => Ok(()),
        }
    }

    async fn interact(&mut self, interaction: &Interaction) -> HarnessResult<()> {
        info!("Clicking {} '{}'...", interaction.role, interaction.name);
        self.session
            .click_by_role(
                &interaction.role,
                &interaction.name,
                interaction.exact,
                interaction.timeout(),
            )
            .await
            .map_err(|e| HarnessError::Interaction {
                role: interaction.role.clone(),
                name: interaction.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Count markers appended since the baseline
    fn deltas(&self, created: Option<&Marker>, updated: Option<&Marker>) -> (usize, usize) {
        let log = self.session.log();
        let new_created = created.map(|m| log.count_since(m, self.baseline)).unwrap_or(0);
        let new_updates = updated.map(|m| log.count_since(m, self.baseline)).unwrap_or(0);
        (new_created, new_updates)
    }

    async fn wait_post(&mut self) -> HarnessResult<()> {
        let scenario = self.scenario;
        let post = &scenario.post_wait;
        let created = self.created();
        let updated = self.updated();

        let deadline = Instant::now() + post.window();
        let mut polls = 0u32;
        let (new_created, new_updates) = loop {
            polls += 1;
            let (new_created, new_updates) = self.deltas(created.as_ref(), updated.as_ref());
            let satisfied =
                new_created >= post.min_new_created && new_updates >= post.min_updates;

            // An upper bound can only be confirmed by watching the full window
            if satisfied && post.max_new_created.is_none() {
                break (new_created, new_updates);
            }

            let now = Instant::now();
            if now >= deadline {
                break (new_created, new_updates);
            }
            sleep(post.interval().min(deadline - now)).await;
        };

        let total = created
            .as_ref()
            .map(|m| self.session.log().count(m))
            .unwrap_or(0);
        self.reporter.record_final(total, new_updates);

        if let Some(marker) = &created {
            info!("Total {} count: {} (+{})", marker.name, total, new_created);
        }
        if let Some(marker) = &updated {
            info!("{} since interaction: {}", marker.name, new_updates);
        }

        if let (Some(max), Some(marker)) = (post.max_new_created, &created) {
            if new_created > max {
                let err = HarnessError::AssertionFailed(format!(
                    "expected at most {} new '{}' after interaction, observed {}",
                    max, marker.name, new_created
                ));
                self.judge(post.severity, err)?;
            }
        }

        for (marker, observed, min) in [
            (&created, new_created, post.min_new_created),
            (&updated, new_updates, post.min_updates),
        ] {
            let Some(marker) = marker else { continue };
            if observed < min {
                let err = HarnessError::EventTimeout {
                    marker: marker.name.clone(),
                    phase: format!("after interaction (expected +{})", min),
                    polls,
                    observed,
                    log: self.session.log().texts(),
                    page_snippet: None,
                };
                self.judge(post.severity, err)?;
            }
        }

        Ok(())
    }

    /// Apply a severity to a missed expectation
    fn judge(&mut self, severity: Severity, err: HarnessError) -> HarnessResult<()> {
        match severity {
            Severity::Required => Err(err),
            Severity::Warn => {
                self.reporter.warn(err.to_string());
                Ok(())
            }
        }
    }
}
