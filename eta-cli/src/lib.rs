//! Command-line interface and HTTP service for dispatch travel estimates.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod config;
mod error;
mod estimate;
mod serve;
pub mod wire;

pub use error::CliError;

use config::{EstimateArgs, ServeArgs};

/// Run the `eta` CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Estimate(args) => estimate::run_estimate(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::BuildRuntime)?;
    runtime.block_on(serve::serve(config))
}

#[derive(Debug, Parser)]
#[command(
    name = "eta",
    about = "Pairwise travel distance and time estimates for dispatch",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve estimates over HTTP.
    Serve(ServeArgs),
    /// Estimate a single request from a JSON file.
    Estimate(EstimateArgs),
}

#[cfg(test)]
mod tests;
