use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod evaluation;
mod input;
mod llm;
mod models;
mod output;
mod runner;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::runner::Runner;

/// RAG evaluation CLI - Score question/answer/context records with an LLM judge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read the dataset from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output format: json or plain
    #[arg(short, long, default_value = "json")]
    output: OutputFormat,

    /// Verbose output - log progress for each record to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Send logs to stderr so stdout only carries the payload
fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let dataset = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            input::read_dataset(BufReader::new(file))?
        }
        None => input::read_dataset(std::io::stdin().lock())?,
    };

    let runner = Runner::from_env(&config)?;
    let payload = runner.run(&dataset).await?;

    output::print_payload(&payload, args.output)?;

    Ok(())
}
