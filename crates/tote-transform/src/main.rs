//! tote-transform CLI: transform the staged file named by a storage event.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use snafu::ResultExt;
use tracing::{error, info};

use tote_core::{ConfigArgs, PipelineConfig, StorageProvider};
use tote_transform::error::EventInputSnafu;
use tote_transform::{
    ReferenceCache, StagedReferences, TransformError, TransformHandler, TransformOutcome,
};

#[derive(Parser, Debug)]
#[command(
    name = "tote-transform",
    version,
    about = "Reshape staged snapshots into dimension and fact files"
)]
#[command(group(ArgGroup::new("input").required(true).args(["event", "key"])))]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Storage-event notification JSON file, or `-` for stdin
    #[arg(long)]
    event: Option<PathBuf>,

    /// Staged object keys to transform directly
    #[arg(long, num_args = 1..)]
    key: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tote_core::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Transform failed");
            eprintln!("Transform failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_event(path: &Path) -> Result<String, TransformError> {
    let display = path.display().to_string();
    if path.as_os_str() == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context(EventInputSnafu { path: display })?;
        return Ok(payload);
    }
    std::fs::read_to_string(path).context(EventInputSnafu { path: display })
}

fn report(outcome: &TransformOutcome) {
    match outcome {
        TransformOutcome::Written { key, rows, .. } => info!(%key, rows, "Processed file written"),
        TransformOutcome::Empty { target } => info!(target = target.name(), "Nothing to write"),
    }
}

async fn run(cli: Cli) -> Result<(), TransformError> {
    let config = PipelineConfig::from_file(&cli.config.config)?;

    if let Some(address) = &config.metrics.address {
        tote_core::metrics::init(address)?;
    }

    let options = config.staging.storage_options.clone();
    let ingestion = StorageProvider::shared(&config.staging.ingestion_url, options.clone()).await?;
    let processed = StorageProvider::shared(&config.staging.processed_url, options).await?;

    let references = Arc::new(ReferenceCache::new(Arc::new(StagedReferences::new(
        Arc::clone(&ingestion),
        config.transform.duplicate_policy,
    ))));
    let handler = TransformHandler::new(ingestion, processed, references);

    if let Some(path) = &cli.event {
        let payload = read_event(path)?;
        report(&handler.handle_event(&payload).await?);
    }
    for key in &cli.key {
        report(&handler.handle_key(key).await?);
    }
    Ok(())
}
