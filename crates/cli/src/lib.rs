//! `keypath` command line tool: lists the schema of the built-in sample data
//! set and evaluates dotted attribute paths against it.

pub mod commands;
pub mod demo;
pub mod util;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing_subscriber::EnvFilter;

use crate::demo::Demo;
use crate::util::CliResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "keypath", version, about = "Evaluate key-path queries over a sample data set")]
pub struct Cli {
    /// Log engine activity to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List compounds and their attributes.
    Schema(commands::schema::SchemaArgs),
    /// Evaluate a dotted path from the sample run.
    Query(commands::query::QueryArgs),
}

pub fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = execute(&cli.command)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}").context("cannot write to stdout")?;
    Ok(())
}

pub fn execute(command: &Command) -> CliResult<String> {
    let demo = Demo::build().context("cannot build the sample schema")?;
    tracing::debug!(?command, "executing");
    match command {
        Command::Schema(args) => commands::schema::run(&demo, args),
        Command::Query(args) => commands::query::run(&demo, args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "keypath_engine=debug,keypath_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
