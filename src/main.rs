// src/main.rs

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use pollbench::{BenchConfig, Cli};
use std::process::ExitCode;

/// Main entry point for the `pollbench` binary.
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    let config = cli.into_config();

    // -v lowers the default filter to debug; RUST_LOG still wins.
    let default_filter = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_micros()
        .target(env_logger::Target::Stdout)
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &BenchConfig) -> anyhow::Result<()> {
    info!(
        "Starting pollbench: {} channels, backend {}",
        config.channels, config.backend
    );

    let outcome = pollbench::run(config)
        .with_context(|| format!("{} benchmark failed", config.backend))?;

    if config.json {
        let json = outcome
            .report
            .to_json()
            .context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        println!("{}", outcome.report.summary_line());
    }

    outcome.ensure_producer_succeeded().context("Producer did not shut down cleanly")?;
    Ok(())
}
