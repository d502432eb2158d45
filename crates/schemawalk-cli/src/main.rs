#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use schemawalk_core::config::resolve_config;
use schemawalk_core::error::ErrorCode;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmd::{CommandError, Context};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "schemawalk: order tables by their foreign keys",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Project root holding `.schemawalk/config.toml` (defaults to the
    /// current directory).
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Print a deletion or insertion order",
        long_about = "Print every table in an order that respects its foreign keys. \
                      Tables caught in a cycle are appended at the end.",
        after_help = "EXAMPLES:\n    # Children before parents\n    schemawalk order schema.toml\n\n    # Parents before children, for a subset\n    schemawalk order schema.toml --insertion --table orders --table customers\n\n    # Emit machine-readable output\n    schemawalk order schema.toml --format json"
    )]
    Order(cmd::order::OrderArgs),

    #[command(
        about = "Print levels of tables that can be created together",
        long_about = "Group tables into batches; every table's parents are in an earlier batch.",
        after_help = "EXAMPLES:\n    # Creation batches\n    schemawalk batches schema.toml\n\n    # Emit machine-readable output\n    schemawalk batches schema.json --format json"
    )]
    Batches(cmd::batches::BatchesArgs),

    #[command(
        about = "List referential cycles",
        long_about = "Enumerate distinct referential cycles, or strongly connected components with --components.",
        after_help = "EXAMPLES:\n    # Distinct cycles\n    schemawalk cycles schema.toml\n\n    # Strongly connected components, at most 5\n    schemawalk cycles schema.toml --components --limit 5"
    )]
    Cycles(cmd::cycles::CyclesArgs),

    #[command(
        about = "Fail if the schema has a referential cycle",
        long_about = "Run a strict ordering and exit non-zero with the first cycle found.",
        after_help = "EXAMPLES:\n    # Gate a migration in CI\n    schemawalk check schema.toml\n\n    # Emit machine-readable output\n    schemawalk check schema.toml --format json"
    )]
    Check(cmd::check::CheckArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SCHEMAWALK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "schemawalk=debug,info"
        } else {
            "schemawalk=info,warn"
        })
    });

    let format = env::var("SCHEMAWALK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    // stdout carries command output; logs go to stderr.
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    // Errors before the config is resolved still honor explicit flags.
    let early_mode = cli
        .format
        .unwrap_or(if cli.json { OutputMode::Json } else { OutputMode::Text });

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err((mode, err)) => {
            debug!(error = ?err, "command failed");
            let mode = mode.unwrap_or(early_mode);
            if render_error(mode, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), (Option<OutputMode>, anyhow::Error)> {
    let root = match cli.root {
        Some(root) => root,
        None => env::current_dir().map_err(|e| (None, e.into()))?,
    };

    let config = resolve_config(&root, cli.json).map_err(|e| {
        let err = CommandError::new(ErrorCode::ConfigParseError, format!("{e:#}"));
        (None, anyhow::Error::new(err))
    })?;
    let output = resolve_output_mode(cli.format, &config.resolved_output);
    debug!(?output, root = %root.display(), "configuration resolved");

    let ctx = Context { output, config };
    let result = match cli.command {
        Commands::Order(ref args) => cmd::order::run_order(args, &ctx),
        Commands::Batches(ref args) => cmd::batches::run_batches(args, &ctx),
        Commands::Cycles(ref args) => cmd::cycles::run_cycles(args, &ctx),
        Commands::Check(ref args) => cmd::check::run_check(args, &ctx),
    };
    result.map_err(|e| (Some(output), e))
}
