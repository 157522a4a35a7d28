//! CLI surface: argument parsing, logging setup, exit codes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::error::{ConvgenError, ExitStatus};
use crate::generate::{generate, Options};

/// Directive-driven struct-to-struct conversion code generator for Go.
#[derive(Parser, Debug)]
#[command(name = "convgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source directory containing directive-annotated Go files.
    pub dir: PathBuf,

    /// Main output file (default: <package_name>.gen.go inside DIR).
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Custom-stub output file (default: custom.gen.go inside DIR).
    #[arg(long)]
    pub custom_output: Option<PathBuf>,

    /// Log destination (default: standard error).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Lower the log level threshold to debug.
    #[arg(long)]
    pub debug: bool,
}

/// Run an invocation end to end. Exit code 0 on success, 1 on any
/// failure.
pub fn run(cli: Cli) -> ExitStatus {
    if let Err(err) = init_logging(&cli) {
        eprintln!("convgen: {}", err);
        return ExitStatus::Failure;
    }

    let options = Options {
        source_dir: cli.dir,
        output: cli.output,
        custom_output: cli.custom_output,
        dump_plan: cli.debug,
    };

    match generate(&options) {
        Ok(outcome) => {
            tracing::info!(
                main = %outcome.main_path.display(),
                custom = outcome
                    .custom_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                functions = outcome.functions,
                stubs = outcome.stubs,
                "generation complete"
            );
            ExitStatus::Success
        }
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("convgen: {}", err);
            err.exit_status()
        }
    }
}

/// Install the tracing subscriber: `CONVGEN_LOG` overrides, `--debug`
/// lowers the default threshold, `--log-file` redirects from stderr.
fn init_logging(cli: &Cli) -> Result<(), ConvgenError> {
    let filter = EnvFilter::try_from_env("CONVGEN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "info" }));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|err| {
                ConvgenError::invalid_args(format!(
                    "cannot open log file {}: {}",
                    path.display(),
                    err
                ))
            })?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
