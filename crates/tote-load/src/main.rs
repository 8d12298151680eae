//! tote-load CLI: append processed files, or the calendar, to the warehouse.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use snafu::ResultExt;
use tracing::{error, info};

use tote_core::table::TargetTable;
use tote_core::{ConfigArgs, PipelineConfig, StorageProvider};
use tote_load::calendar::{self, DEFAULT_END, DEFAULT_START};
use tote_load::error::EventInputSnafu;
use tote_load::{DeltaWarehouse, LoadError, LoadHandler, LoadReceipt, append_in_transaction};

#[derive(Parser, Debug)]
#[command(name = "tote-load", version, about = "Append processed files to the warehouse")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load processed files named by a storage event or by key
    #[command(group(ArgGroup::new("input").required(true).args(["event", "key"])))]
    Files {
        /// Storage-event notification JSON file, or `-` for stdin
        #[arg(long)]
        event: Option<PathBuf>,

        /// Processed object keys to load directly
        #[arg(long, num_args = 1..)]
        key: Vec<String>,
    },

    /// Populate dim_date for an inclusive date range
    DimDate {
        #[arg(long, default_value_t = DEFAULT_START)]
        start: NaiveDate,

        #[arg(long, default_value_t = DEFAULT_END)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tote_core::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Load failed");
            eprintln!("Load failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_event(path: &Path) -> Result<String, LoadError> {
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

fn report(receipt: &LoadReceipt) {
    info!(
        table = receipt.table.name(),
        rows = receipt.rows,
        version = receipt.version,
        "Load committed"
    );
}

async fn run(cli: Cli) -> Result<(), LoadError> {
    let config = PipelineConfig::from_file(&cli.config.config)?;

    if let Some(address) = &config.metrics.address {
        tote_core::metrics::init(address)?;
    }

    let warehouse_config = config.require_warehouse()?;
    let warehouse = Arc::new(DeltaWarehouse::new(
        warehouse_config.root_url.clone(),
        warehouse_config.storage_options.clone(),
    ));

    match cli.command {
        Command::Files { event, key } => {
            let processed = StorageProvider::shared(
                &config.staging.processed_url,
                config.staging.storage_options.clone(),
            )
            .await?;
            let handler = LoadHandler::new(processed, warehouse);

            if let Some(path) = &event {
                let payload = read_event(path)?;
                report(&handler.handle_event(&payload).await?);
            }
            for key in &key {
                report(&handler.handle_key(key).await?);
            }
        }
        Command::DimDate { start, end } => {
            let batch = calendar::dim_date(start, end)?;
            info!(%start, %end, rows = batch.num_rows(), "Generated calendar");
            report(&append_in_transaction(warehouse.as_ref(), TargetTable::DimDate, &batch).await?);
        }
    }
    Ok(())
}
