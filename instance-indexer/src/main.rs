use std::env;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use instance_indexer::{Dependencies, IndexerConfig, IndexingError};
use instance_indexer_repository::opensearch::index_config::index_settings;
use instance_indexer_shared::InstanceSchema;

#[derive(Parser)]
#[command(name = "instance-indexer")]
#[command(about = "Keeps the compute instance search index in sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume compute notifications and apply them to the index
    Listen,
    /// List every instance from the compute API and reload the index
    Resync,
    /// Create the index with its mappings if it does not exist
    CreateIndex {
        /// Print the index settings and mappings instead of creating the index
        #[arg(long)]
        print: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

async fn run(command: Commands) -> Result<(), IndexingError> {
    let config = IndexerConfig::from_env()?;

    if let Commands::CreateIndex { print: true } = command {
        let settings = index_settings(&config.index, &InstanceSchema);
        let rendered = serde_json::to_string_pretty(&settings)
            .map_err(|e| IndexingError::config(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    let deps = Dependencies::new(config).await?;

    match command {
        Commands::Listen => {
            info!("Starting event listener");
            deps.orchestrator()?.run().await?;
        }
        Commands::Resync => {
            let summary = deps.catch_up_job().run().await?;
            info!(
                listed = summary.listed,
                indexed = summary.indexed,
                skipped = summary.skipped,
                swept = summary.swept,
                "Resync finished"
            );
        }
        Commands::CreateIndex { .. } => {
            deps.plugin.ensure_index().await?;
            info!(index_name = %deps.plugin.index_name(), "Index ready");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Instance indexer failed");
            ExitCode::FAILURE
        }
    }
}
