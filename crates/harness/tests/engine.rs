//! State machine runs against a scripted page.
//!
//! Run with: cargo test --package chartcheck-harness --test engine

mod support;

use std::path::Path;

use chartcheck_harness::browser::{BrowserSession, SessionState};
use chartcheck_harness::engine::{Engine, RunState};
use chartcheck_harness::error::HarnessResult;
use chartcheck_harness::report::{Reporter, VerificationResult};
use chartcheck_harness::scenario::Severity;
use chartcheck_harness::Scenario;
use support::{console, page_error, Script, ScriptedLauncher};

const TIMEFRAME: &str = r#"
name: chart-timeframe-switch
route: /day-trading
wait_for:
  - canvas
markers:
  created: CHART_CREATED
  updated: DATA_UPDATED
initial_wait:
  iterations: 30
  interval_ms: 500
settle_ms: 2000
interaction:
  role: button
  name: 15m
post_wait:
  window_ms: 3000
  interval_ms: 500
"#;

fn timeframe() -> Scenario {
    Scenario::from_yaml(TIMEFRAME).unwrap()
}

async fn run(
    scenario: &Scenario,
    launcher: &ScriptedLauncher,
    dir: &Path,
) -> (HarnessResult<()>, VerificationResult) {
    let mut session = BrowserSession::open(launcher).await.unwrap();
    let mut reporter = Reporter::new(&scenario.name);

    let outcome = Engine::new(
        &mut session,
        scenario,
        &mut reporter,
        "http://localhost:3000",
        dir,
    )
    .run()
    .await;

    let log = session.log().clone();
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let result = reporter.finish(outcome.as_ref().err(), Some(&log), None);
    (outcome, result)
}

#[tokio::test(start_paused = true)]
async fn timeframe_switch_recreates_chart() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script::healthy());

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert!(result.success());
    assert_eq!(result.initial_count(), 1);
    assert_eq!(result.total_count(), 2);
    assert_eq!(result.update_count(), 1);
    assert!(result.error().is_none());
    assert!(dir.path().join("chart.png").exists());
    assert!(!dir.path().join("chart_error.png").exists());
    assert_eq!(result.screenshots().len(), 1);
    assert_eq!(
        result.states(),
        &[
            RunState::Navigating,
            RunState::WaitingInitialEvent,
            RunState::Stabilizing,
            RunState::Interacting,
            RunState::WaitingPostEvent,
            RunState::Capturing,
            RunState::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn listeners_exist_before_navigation() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script::healthy());

    run(&timeframe(), &launcher, dir.path()).await.0.unwrap();

    let calls = launcher.calls();
    assert_eq!(calls[0], "launch");
    assert_eq!(calls[1], "subscribe");
    assert_eq!(calls[2], "goto http://localhost:3000/day-trading");
    assert_eq!(calls[3], "wait canvas visible");
    assert!(calls.contains(&"click button 15m exact=true".to_string()));
    assert_eq!(calls.last().unwrap(), "close");
}

#[tokio::test(start_paused = true)]
async fn missing_initial_marker_fails_with_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![console(100, "websocket connected")],
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert!(!result.success());
    assert_eq!(result.error_kind(), Some("EventTimeoutError"));
    assert!(result.error().unwrap().contains("CHART_CREATED"));
    assert!(result.page_snippet().unwrap().contains("id=\"chart\""));
    assert!(dir.path().join("chart_error.png").exists());
    assert!(!launcher.called("click"));
    assert_eq!(
        &result.states()[result.states().len() - 2..],
        &[RunState::Capturing, RunState::Failed]
    );
    assert_eq!(result.events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn marker_must_match_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![console(100, "CHART_CREATED_LEGACY")],
        ..Script::healthy()
    });

    let (outcome, _) = run(&timeframe(), &launcher, dir.path()).await;
    assert!(outcome.is_err());
}

#[tokio::test(start_paused = true)]
async fn warn_severity_keeps_going_without_initial_marker() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = timeframe();
    scenario.initial_wait.as_mut().unwrap().severity = Severity::Warn;
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![],
        ..Script::healthy()
    });

    let (outcome, result) = run(&scenario, &launcher, dir.path()).await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert_eq!(result.initial_count(), 0);
    assert_eq!(result.total_count(), 1);
    assert_eq!(result.warnings().len(), 1);
    assert!(launcher.called("click"));
}

#[tokio::test(start_paused = true)]
async fn navigation_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        fail_goto: true,
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("NavigationError"));
    assert!(result.error().unwrap().contains("/day-trading"));
    assert!(dir.path().join("chart_error.png").exists());
    assert_eq!(
        result.states(),
        &[RunState::Navigating, RunState::Capturing, RunState::Failed]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_selector_is_a_navigation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        missing: vec!["canvas".into()],
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("NavigationError"));
    assert!(result.error().unwrap().contains("canvas"));
}

#[tokio::test(start_paused = true)]
async fn missing_control_is_an_interaction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        fail_click: true,
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("InteractionError"));
    assert!(result.error().unwrap().contains("15m"));
    assert_eq!(result.initial_count(), 1);
    assert!(dir.path().join("chart_error.png").exists());
}

#[tokio::test(start_paused = true)]
async fn click_without_new_chart_fails() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        on_click: vec![],
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("EventTimeoutError"));
    assert!(result.error().unwrap().contains("after interaction"));
    assert_eq!(result.initial_count(), 1);
    assert_eq!(result.total_count(), 1);
    assert_eq!(result.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn updates_before_baseline_do_not_count() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![console(300, "CHART_CREATED"), console(600, "DATA_UPDATED")],
        on_click: vec![console(200, "CHART_CREATED")],
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert!(result.error().unwrap().contains("DATA_UPDATED"));
    assert_eq!(result.total_count(), 2);
    assert_eq!(result.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_chart_creation_exceeds_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = timeframe();
    scenario.post_wait.max_new_created = Some(1);
    let launcher = ScriptedLauncher::new(Script {
        on_click: vec![
            console(200, "CHART_CREATED"),
            console(400, "DATA_UPDATED"),
            console(2500, "CHART_CREATED"),
        ],
        ..Script::healthy()
    });

    let (outcome, result) = run(&scenario, &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("AssertionError"));
    assert_eq!(result.total_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn double_mounted_chart_fails_before_interaction() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = timeframe();
    scenario.initial_wait.as_mut().unwrap().max_count = Some(1);
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![console(300, "CHART_CREATED"), console(350, "CHART_CREATED")],
        ..Script::healthy()
    });

    let (outcome, result) = run(&scenario, &launcher, dir.path()).await;

    assert!(outcome.is_err());
    assert_eq!(result.error_kind(), Some("AssertionError"));
    assert!(result.error().unwrap().contains("at most 1"));
    assert_eq!(result.initial_count(), 2);
    assert!(!launcher.called("click"));
    assert_eq!(result.states().last(), Some(&RunState::Failed));
    assert!(dir.path().join("chart_error.png").exists());
}

#[tokio::test(start_paused = true)]
async fn double_mounted_chart_only_warns_when_lenient() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = timeframe();
    let budget = scenario.initial_wait.as_mut().unwrap();
    budget.max_count = Some(1);
    budget.severity = Severity::Warn;
    let launcher = ScriptedLauncher::new(Script {
        on_goto: vec![console(300, "CHART_CREATED"), console(350, "CHART_CREATED")],
        ..Script::healthy()
    });

    let (outcome, result) = run(&scenario, &launcher, dir.path()).await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert_eq!(result.initial_count(), 2);
    assert_eq!(result.warnings().len(), 1);
    assert!(launcher.called("click"));
}

#[tokio::test(start_paused = true)]
async fn screenshot_failure_does_not_change_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        fail_screenshot: true,
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert!(result.success());
    assert!(result.screenshots().is_empty());
    assert_eq!(result.states().last(), Some(&RunState::Done));
}

#[tokio::test(start_paused = true)]
async fn screenshot_failure_keeps_navigation_cause() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new(Script {
        fail_goto: true,
        fail_screenshot: true,
        ..Script::healthy()
    });

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert_eq!(outcome.unwrap_err().kind(), "NavigationError");
    assert_eq!(result.error_kind(), Some("NavigationError"));
    assert!(result.screenshots().is_empty());
    assert!(!dir.path().join("chart_error.png").exists());
    assert_eq!(
        result.states(),
        &[RunState::Navigating, RunState::Capturing, RunState::Failed]
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_without_interaction() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = Scenario::from_yaml(
        r#"
name: day-trading-snapshot
route: /day-trading
markers:
  created: CHART_CREATED
initial_wait: {}
settle_ms: 5000
screenshots:
  success: snapshot.png
  full_page: true
"#,
    )
    .unwrap();
    let launcher = ScriptedLauncher::new(Script::healthy());

    let (outcome, result) = run(&scenario, &launcher, dir.path()).await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert_eq!(result.initial_count(), 1);
    assert_eq!(result.total_count(), 1);
    assert!(!launcher.called("click"));
    assert!(launcher
        .calls()
        .iter()
        .any(|c| c.starts_with("screenshot") && c.ends_with("full_page=true")));
    assert!(dir.path().join("snapshot.png").exists());
    assert_eq!(
        result.states(),
        &[
            RunState::Navigating,
            RunState::WaitingInitialEvent,
            RunState::Stabilizing,
            RunState::Capturing,
            RunState::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn page_errors_are_kept_with_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = Script::healthy();
    script
        .on_goto
        .push(page_error(150, "TypeError: series is undefined"));
    let launcher = ScriptedLauncher::new(script);

    let (outcome, result) = run(&timeframe(), &launcher, dir.path()).await;

    assert!(outcome.is_ok());
    assert_eq!(result.page_errors(), &["TypeError: series is undefined".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn failed_subscription_closes_the_browser() {
    let launcher = ScriptedLauncher::new(Script {
        fail_subscribe: true,
        ..Script::healthy()
    });

    let opened = BrowserSession::open(&launcher).await;

    assert!(opened.is_err());
    assert_eq!(launcher.calls(), vec!["launch", "subscribe", "close"]);
}
