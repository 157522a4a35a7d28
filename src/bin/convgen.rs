//! convgen CLI binary entry point.

use std::process::ExitCode;

use clap::Parser;

use convgen::cli::{run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    ExitCode::from(run(cli).code())
}
