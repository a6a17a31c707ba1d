// classdebug CLI entry point
use anyhow::{anyhow, Context, Result};
use classdebug_cli::{logging, spawn_report, Cli};
use classdebug_meta::TracingSink;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse_lenient();
    logging::init(cli.log_level.as_deref())?;

    let config = cli.into_configuration();
    let worker = spawn_report(config, TracingSink).context("failed to start the report worker")?;
    let outcome = worker
        .join()
        .map_err(|_| anyhow!("report worker panicked"))?;

    // Resolution errors were already logged by the worker.
    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}
