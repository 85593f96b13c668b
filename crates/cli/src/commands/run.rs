//! `chartcheck run`

use std::path::{Path, PathBuf};

use anyhow::Context;
use chartcheck_harness::config::BrowserEngine;
use chartcheck_harness::{Harness, HarnessConfig, Scenario};
use clap::Args;
use tracing::{info, warn};

use super::Outcome;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario file, or a directory of scenario files
    #[arg(short, long, env = "CHARTCHECK_SCENARIO", default_value = "scenarios")]
    pub scenario: PathBuf,

    /// Harness configuration file
    #[arg(short, long, env = "CHARTCHECK_CONFIG", default_value = "chartcheck.toml")]
    pub config: PathBuf,

    /// Directory receiving screenshots and result.json
    #[arg(long, env = "CHARTCHECK_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Target host
    #[arg(long, env = "CHARTCHECK_HOST")]
    pub host: Option<String>,

    /// Target port
    #[arg(short, long, env = "CHARTCHECK_PORT")]
    pub port: Option<u16>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, env = "CHARTCHECK_BROWSER")]
    pub browser: Option<BrowserEngine>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Kill whatever listens on the target port before starting
    #[arg(long)]
    pub reclaim_port: bool,

    /// Do not write result.json
    #[arg(long)]
    pub no_report: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir = dir.clone();
        }
        if let Some(host) = &self.host {
            config.readiness.host = host.clone();
        }
        if let Some(port) = self.port {
            config.readiness.port = port;
        }
        if let Some(engine) = self.browser {
            config.browser.engine = engine;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.reclaim_port {
            config.process.reclaim_port = true;
        }
    }
}

fn load_scenarios(path: &Path) -> anyhow::Result<Vec<Scenario>> {
    if path.is_dir() {
        let scenarios = Scenario::load_all(path)
            .with_context(|| format!("Failed to load scenarios from {}", path.display()))?;
        if scenarios.is_empty() {
            anyhow::bail!("No scenario files found in {}", path.display());
        }
        Ok(scenarios)
    } else {
        let scenario = Scenario::from_file(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?;
        Ok(vec![scenario])
    }
}

pub async fn execute(args: RunArgs, format: OutputFormat) -> anyhow::Result<Outcome> {
    let mut config = HarnessConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let scenarios = load_scenarios(&args.scenario)?;
    let several = scenarios.len() > 1;
    let root = config.artifact_dir.clone();
    let mut overall = Outcome::Passed;

    for scenario in scenarios {
        let mut config = config.clone();
        if several {
            config.artifact_dir = root.join(&scenario.name);
        }
        let artifact_dir = config.artifact_dir.clone();

        let harness = Harness::new(config, scenario);
        let (result, outcome) = match harness.run().await {
            Ok(result) => (result, Outcome::Passed),
            Err(failure) => {
                let outcome = if failure.cause.kind() == "ConfigError" {
                    Outcome::UsageError
                } else {
                    Outcome::Failed
                };
                (failure.result, outcome)
            }
        };

        if !args.no_report {
            if let Err(e) = result.write_json(&artifact_dir) {
                warn!("Could not write result.json: {}", e);
            }
        }

        output::print_result(&result, format);
        match outcome {
            Outcome::Passed => output::print_success(&format!(
                "{}: {}",
                result.scenario(),
                result.summary()
            )),
            _ => output::print_error(&format!("{}: {}", result.scenario(), result.summary())),
        }
        overall = overall.merge(outcome);
    }

    info!("Run finished with exit code {}", overall.code());
    Ok(overall)
}
