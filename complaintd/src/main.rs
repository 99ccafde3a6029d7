use clap::Parser;
use complaints::api::{self, ApiState};
use complaints::memory_store::MemoryStore;
use complaints::service::ComplaintService;
use geo::GeoResolver;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
use config::{Config, MetricsConfig};

#[derive(Parser)]
#[command(name = "complaintd", about = "Complaint recording service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum RunError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("could not build geo resolver: {0}")]
    Resolver(#[from] reqwest::Error),
    #[error("could not build metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a global metrics recorder is already installed")]
    RecorderInstall,
    #[error("API error: {0}")]
    Api(#[from] api::ApiError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "complaintd exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), RunError> {
    let config = Config::from_file(&cli.config)?;

    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
    }

    let resolver = Arc::new(GeoResolver::new(config.geo)?);
    let service = Arc::new(ComplaintService::new(MemoryStore::new()));

    api::serve(&config.listener, ApiState { service, resolver }).await?;
    Ok(())
}

fn init_metrics(config: &MetricsConfig) -> Result<(), RunError> {
    let recorder = StatsdBuilder::from(&config.statsd_host, config.statsd_port)
        .build(Some("complaintd"))?;
    metrics::set_global_recorder(recorder).map_err(|_| RunError::RecorderInstall)?;

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "metrics exporter initialized"
    );
    Ok(())
}
