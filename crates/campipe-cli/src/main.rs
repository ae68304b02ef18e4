// SPDX-License-Identifier: Apache-2.0

mod error;
mod run;
mod utils;

use std::process::ExitCode;

use clap::Parser;

use crate::error::result_to_exit_code;

/// Exercise the camera capture paths of the video pipeline, optionally
/// scaling, displaying and saving the captured frames.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Print frame rate reports as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    run: run::Args,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    result_to_exit_code(run::execute(cli.run, cli.json))
}
