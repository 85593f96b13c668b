//! Run orchestration: target process, readiness, browser session, engine, and
//! unconditional teardown

use std::time::Duration;
use tracing::{error, info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, PlaywrightLauncher};
use crate::config::HarnessConfig;
use crate::diagnostics::DiagnosticLog;
use crate::engine::Engine;
use crate::error::{HarnessResult, RunFailure};
use crate::probe::{is_listening, ReadinessCheck};
use crate::report::{Reporter, VerificationResult};
use crate::scenario::Scenario;
use crate::supervisor::{reclaim_port, TargetProcess};

/// Runs one scenario end to end against a freshly started target
pub struct Harness<L = PlaywrightLauncher> {
    config: HarnessConfig,
    scenario: Scenario,
    launcher: L,
}

impl Harness<PlaywrightLauncher> {
    /// Harness driving a real browser through Playwright
    pub fn new(config: HarnessConfig, scenario: Scenario) -> Self {
        let launcher = PlaywrightLauncher::new(config.browser.clone());
        Self::with_launcher(config, scenario, launcher)
    }
}

impl<L: BrowserLauncher> Harness<L> {
    pub fn with_launcher(config: HarnessConfig, scenario: Scenario, launcher: L) -> Self {
        Self {
            config,
            scenario,
            launcher,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run the scenario.
    ///
    /// The target process group is terminated before this returns, whatever
    /// the outcome. On failure the original cause is returned together with
    /// the partial result; teardown problems are only logged.
    pub async fn run(&self) -> Result<VerificationResult, RunFailure> {
        info!("Verifying scenario '{}'", self.scenario.name);
        let mut reporter = Reporter::new(&self.scenario.name);

        if let Err(cause) = self.config.validate().and_then(|_| self.scenario.validate()) {
            let result = reporter.finish(Some(&cause), None, None);
            return Err(RunFailure { cause, result });
        }

        let readiness = &self.config.readiness;
        if self.config.process.reclaim_port {
            let signalled = reclaim_port(readiness.port);
            if signalled > 0 {
                info!("Reclaimed port {} from {} process(es)", readiness.port, signalled);
            }
        }

        let mut process = match TargetProcess::start(&self.config.process) {
            Ok(process) => process,
            Err(cause) => {
                let result = reporter.finish(Some(&cause), None, None);
                return Err(RunFailure { cause, result });
            }
        };

        let mut log = None;
        let outcome = self.drive(&mut process, &mut reporter, &mut log).await;

        // Teardown happens before anything is reported
        if let Err(e) = process.stop().await {
            warn!("Stopping target failed: {}", e);
        }
        let connect_timeout = Duration::from_millis(readiness.connect_timeout_ms);
        if is_listening(&readiness.host, readiness.port, connect_timeout).await {
            warn!(
                "{}:{} still accepts connections after teardown",
                readiness.host, readiness.port
            );
        }

        match outcome {
            Ok(()) => {
                let result = reporter.finish(None, log.as_ref(), None);
                info!("Verification result: {}", result.summary());
                Ok(result)
            }
            Err(cause) => {
                let stderr = cause
                    .target_stderr()
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| process.stderr());
                let result = reporter.finish(Some(&cause), log.as_ref(), Some(stderr));
                error!("Verification failed: {}", cause);
                Err(RunFailure { cause, result })
            }
        }
    }

    async fn drive(
        &self,
        process: &mut TargetProcess,
        reporter: &mut Reporter,
        log: &mut Option<DiagnosticLog>,
    ) -> HarnessResult<()> {
        let probe = ReadinessCheck::from(&self.config.readiness);
        probe.wait_for(process).await?;
        process.mark_ready()?;

        let mut session = BrowserSession::open(&self.launcher).await?;
        *log = Some(session.log().clone());

        let outcome = match process.mark_running() {
            Ok(()) => {
                Engine::new(
                    &mut session,
                    &self.scenario,
                    reporter,
                    self.config.base_url(),
                    &self.config.artifact_dir,
                )
                .run()
                .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = session.close().await {
            warn!("Closing browser failed: {}", e);
        }
        outcome
    }
}
