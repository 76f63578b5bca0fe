//! transcript-harvest command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use transcript_harvest::config::DEFAULT_CONFIG_PATH;
use transcript_harvest::{Config, Exporter, run_with_shutdown};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Exports conversation transcripts to a CSV table", long_about = None)]
struct Args {
    /// Settings file (JSON)
    #[arg(short, long, env = "TRANSCRIPT_HARVEST_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the input table from the settings file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Override the output table from the settings file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("transcript_harvest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn run(args: Args) -> transcript_harvest::Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(input) = args.input {
        config.input_csv_path = input;
    }
    if let Some(output) = args.output {
        config.output_csv_path = output;
    }
    tracing::debug!(config = ?config, "Settings loaded");

    let summary = run_with_shutdown(Exporter::new(config)).await?;

    println!("All done.");
    println!(
        "{} identifiers: {} exported, {} failed, {} retries, {} rows in {} batches",
        summary.identifiers,
        summary.succeeded,
        summary.failed,
        summary.retries,
        summary.rows_written,
        summary.batches_flushed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env may supply RUST_LOG and TRANSCRIPT_HARVEST_CONFIG
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
