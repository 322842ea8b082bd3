use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use review_refinery::app::bootstrap;
use review_refinery::app::validation::validate_records;
use review_refinery::config::Settings;
use review_refinery::logging;
use review_refinery::observability;
use review_refinery::server::{start_server, AppState};

#[derive(Parser)]
#[command(name = "review-refinery")]
#[command(about = "Cleans review records, masks person names and refines ratings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the full workflow over a JSON file of records
    Optimize {
        /// Path to a JSON array of records
        #[arg(long)]
        input: PathBuf,
    },
    /// Print a page of the consolidated final records
    Retrieve {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = review_refinery::constants::DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Print the learned value table
    InspectTable,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init_logging(&settings.log_dir());

    match cli.command {
        Commands::Serve { port } => {
            if let Some(metrics_port) = settings.metrics_port {
                observability::init_metrics(metrics_port);
            }
            if settings.auth_token.is_empty() {
                warn!("No auth token configured; /retrieve will reject every request");
            }
            let services = bootstrap(&settings).context("Failed to start services")?;
            let state = AppState::new(
                Arc::new(services),
                &settings.auth_token,
                settings.rate_limit_per_minute,
            );
            start_server(state, port.unwrap_or(settings.port)).await?;
        }
        Commands::Optimize { input } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let instance: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", input.display()))?;
            let records = validate_records(&instance)?;

            let services = bootstrap(&settings).context("Failed to start services")?;
            match services.optimize.execute(&records).await {
                Ok(summary) => {
                    info!("Batch {} finished", summary.batch_id);
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => {
                    error!("Workflow failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Retrieve { page, per_page } => {
            let services = bootstrap(&settings).context("Failed to start services")?;
            match services.retrieve.execute(page, per_page)? {
                Some(page) => println!("{}", serde_json::to_string_pretty(&page)?),
                None => println!("No records found"),
            }
        }
        Commands::InspectTable => {
            let services = bootstrap(&settings).context("Failed to start services")?;
            let table = services.agent.snapshot();
            if table.is_empty() {
                println!("Value table is empty");
            }
            for (state, action, value) in table.entries() {
                println!("state {:>2}  action {:>+2}  value {:.6}", state.value(), action.delta(), value);
            }
        }
    }
    Ok(())
}
