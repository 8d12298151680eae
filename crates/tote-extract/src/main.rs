//! tote-extract CLI: one extraction run against the source database.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use snafu::ResultExt;
use tracing::{error, info};

use tote_core::watermark::{StorageWatermarkStore, Watermark};
use tote_core::{ConfigArgs, DbCredentials, PipelineConfig, RunTimestamp, StorageProvider};
use tote_extract::error::{ExtractError, OverrideSnafu};
use tote_extract::source::PostgresConnector;
use tote_extract::{ExtractionJob, Orchestrator, RunOverrides, SnapshotWriter};

#[derive(Parser, Debug)]
#[command(name = "tote-extract", version, about = "Capture changed source rows into the staging store")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Capture rows changed after this timestamp instead of the stored
    /// watermark. `None` captures everything.
    #[arg(long)]
    watermark: Option<String>,

    /// Run timestamp to stamp snapshots with (`YYYY-MM-DD HH:MM:SS.ffffff`).
    #[arg(long)]
    run_timestamp: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tote_core::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Extraction failed");
            eprintln!("Extraction failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ExtractError> {
    let config = PipelineConfig::from_file(&cli.config.config)?;

    if let Some(address) = &config.metrics.address {
        tote_core::metrics::init(address)?;
    }

    let overrides = RunOverrides {
        watermark: cli
            .watermark
            .as_deref()
            .map(Watermark::parse)
            .transpose()
            .context(OverrideSnafu)?,
        run_timestamp: cli
            .run_timestamp
            .as_deref()
            .map(RunTimestamp::parse)
            .transpose()
            .context(OverrideSnafu)?,
        connection: None,
    };

    let secrets = config.secrets.store();
    let credentials =
        DbCredentials::load(secrets.as_ref(), &config.source.credentials_secret).await?;
    info!(
        host = %credentials.host,
        database = %credentials.database,
        "Loaded source credentials"
    );

    let options = config.staging.storage_options.clone();
    let ingestion = StorageProvider::shared(&config.staging.ingestion_url, options.clone()).await?;
    let watermark_storage = if config.watermark_store_url() == config.staging.ingestion_url {
        Arc::clone(&ingestion)
    } else {
        StorageProvider::shared(config.watermark_store_url(), options).await?
    };

    let orchestrator = Orchestrator::new(
        Arc::new(StorageWatermarkStore::new(watermark_storage)),
        config.watermark.parameter.clone(),
        Arc::new(PostgresConnector::new(credentials)),
    )
    .with_max_concurrent_captures(config.source.max_concurrent_captures);

    let job = ExtractionJob::new(orchestrator, SnapshotWriter::new(ingestion));
    let report = job.run(overrides).await?;

    info!(
        run_timestamp = %report.run_timestamp,
        staged = report.staged.len(),
        unchanged = report.unchanged.len(),
        "Extraction run finished"
    );
    Ok(())
}
