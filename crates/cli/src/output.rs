//! Output formatting for CLI

use chartcheck_harness::{Scenario, VerificationResult};
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print one verification result
pub fn print_result(result: &VerificationResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["Scenario", "Initial", "Total", "Updates", "Outcome"]);

            let outcome = if result.success() {
                "PASS".green().bold().to_string()
            } else {
                "FAIL".red().bold().to_string()
            };
            table.add_row(vec![
                result.scenario().to_string(),
                result.initial_count().to_string(),
                result.total_count().to_string(),
                result.update_count().to_string(),
                outcome,
            ]);
            println!("{table}");

            if let Some(error) = result.error() {
                let kind = result.error_kind().unwrap_or("Error");
                println!("{} {}", format!("{}:", kind).red().bold(), error);
            }
            for warning in result.warnings() {
                print_warning(warning);
            }
            for page_error in result.page_errors() {
                println!("  {} {}", "pageerror".yellow(), page_error);
            }
            for shot in result.screenshots() {
                println!("  {} {}", "screenshot".cyan(), shot.display());
            }
            if let Some(stderr) = result.process_stderr().filter(|s| !s.trim().is_empty()) {
                println!("{}", "Target stderr:".dimmed());
                for line in stderr.lines().rev().take(20).collect::<Vec<_>>().into_iter().rev() {
                    println!("  {}", line.dimmed());
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(result).unwrap_or_default());
        }
    }
}

/// Print a listing of loaded scenarios
pub fn print_scenarios(scenarios: &[Scenario], format: OutputFormat) {
    if scenarios.is_empty() {
        println!("No scenarios found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["Name", "Route", "Created", "Updated", "Interaction"]);
            for scenario in scenarios {
                let interaction = scenario
                    .interaction
                    .as_ref()
                    .map(|i| format!("{} \"{}\"", i.role, i.name))
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(vec![
                    scenario.name.clone(),
                    scenario.route.clone(),
                    scenario.markers.created.clone().unwrap_or_else(|| "-".into()),
                    scenario.markers.updated.clone().unwrap_or_else(|| "-".into()),
                    interaction,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(scenarios).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(scenarios).unwrap_or_default());
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}
