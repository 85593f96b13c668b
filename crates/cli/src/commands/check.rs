//! `chartcheck check`

use std::path::PathBuf;

use chartcheck_harness::{HarnessConfig, Scenario};
use clap::Args;
use colored::Colorize;

use super::Outcome;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Scenario files or directories to validate
    #[arg(default_value = "scenarios")]
    pub paths: Vec<PathBuf>,

    /// Also validate this harness configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: CheckArgs, format: OutputFormat) -> anyhow::Result<Outcome> {
    let mut outcome = Outcome::Passed;

    if let Some(path) = &args.config {
        match HarnessConfig::load(path).and_then(|c| c.validate()) {
            Ok(()) => output::print_success(&format!("{} is valid", path.display())),
            Err(e) => {
                eprintln!("{} {}: {}", "Invalid:".red().bold(), path.display(), e);
                outcome = Outcome::UsageError;
            }
        }
    }

    let mut scenarios = Vec::new();
    for path in &args.paths {
        let loaded = if path.is_dir() {
            Scenario::load_all(path)
        } else {
            Scenario::from_file(path).map(|s| vec![s])
        };

        match loaded {
            Ok(found) => scenarios.extend(found),
            Err(e) => {
                eprintln!("{} {}: {}", "Invalid:".red().bold(), path.display(), e);
                outcome = Outcome::UsageError;
            }
        }
    }

    output::print_scenarios(&scenarios, format);
    if outcome == Outcome::Passed {
        output::print_success(&format!("{} scenario(s) valid", scenarios.len()));
    }
    Ok(outcome)
}
