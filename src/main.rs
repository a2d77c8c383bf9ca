//! gatherdata - Gather CSV and JSON data and exercise caches
//!
//! Runs the selected routines one after another. A failing routine is
//! reported and the next one runs, except the on-disk store routine, whose
//! failure ends the process.

use std::io;
use std::process;

use clap::Parser;
use log::error;

use gatherdata::cli::{Cli, Command, RunConfig};
use gatherdata::routines::run_routine;

/// Sets up env_logger at the configured level; `RUST_LOG` takes precedence
fn init_logging(config: &RunConfig) {
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = RunConfig::from_cli(&cli)?;
    init_logging(&config);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for routine in config.command.routines() {
        if let Err(err) = run_routine(routine, &config, &mut out).await {
            error!("{:?}: {}", routine, err);
            if routine == Command::DiskStore {
                process::exit(1);
            }
        }
    }

    Ok(())
}
