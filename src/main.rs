//! The lodestar binary.

use std::process::ExitCode;
use clap::Parser;
use lodestar::config::{Args, Config};
use lodestar::operation;

fn main() -> ExitCode {
    let config = Config::from_args(Args::parse());

    env_logger::Builder::new()
        .filter_level(config.log_level)
        .format_timestamp(None)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to create runtime: {}", err);
            return ExitCode::FAILURE
        }
    };

    match runtime.block_on(operation::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
