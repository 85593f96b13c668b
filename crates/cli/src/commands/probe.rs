//! `chartcheck probe`

use std::time::Duration;

use chartcheck_harness::probe::ReadinessCheck;
use clap::Args;

use super::Outcome;
use crate::output;

#[derive(Args)]
pub struct ProbeArgs {
    /// Host to connect to
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to connect to
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Connection attempts before giving up
    #[arg(long, default_value = "60")]
    pub retries: u32,

    /// Delay between attempts in milliseconds
    #[arg(long, default_value = "2000")]
    pub interval_ms: u64,
}

pub async fn execute(args: ProbeArgs) -> anyhow::Result<Outcome> {
    if args.retries == 0 {
        anyhow::bail!("--retries must be at least 1");
    }

    let check = ReadinessCheck::new(
        &args.host,
        args.port,
        args.retries,
        Duration::from_millis(args.interval_ms),
    );
    let outcome = check.run().await;

    if outcome.is_ready() {
        output::print_success(&format!(
            "{}:{} accepted a connection after {} attempt(s)",
            args.host,
            args.port,
            outcome.attempts()
        ));
        Ok(Outcome::Passed)
    } else {
        output::print_error(&format!(
            "{}:{} did not accept a connection within {} attempt(s)",
            args.host,
            args.port,
            outcome.attempts()
        ));
        Ok(Outcome::Failed)
    }
}
