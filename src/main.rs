//! # Main Entry Point
//!
//! Wires the dispatcher to its collaborators:
//! - Domain: Configuration, Types and collaborator traits
//! - Infrastructure: workflow server endpoints, generation backends, tracking, clock
//! - Application: Dispatcher, gates, queue, checkpointing, status logging
//!

mod application;
mod domain;
mod infrastructure;
mod strings;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use crate::application::dispatcher::{Collaborators, Dispatcher, RunSummary};
use crate::application::logging::LoggingObserver;
use crate::application::state::CheckpointStore;
use crate::domain::config::AppConfig;
use crate::domain::traits::{CustomerSource, Tracker};
use crate::domain::types::Customer;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::customers::{FileCustomerSource, HttpCustomerSource};
use crate::infrastructure::gateway::HttpSender;
use crate::infrastructure::http::http_client;
use crate::infrastructure::llm::Client as LlmClient;
use crate::infrastructure::tracking::{HttpTracker, JsonlTracker};

const DEFAULT_TRACKING_FILE: &str = "data/tracking.jsonl";

#[derive(Parser)]
#[command(
    name = "outreach",
    about = "Paced, business-hours-aware personalised message dispatch",
    version
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true, default_value = "data/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the customer list and dispatch to every recipient
    Run {
        /// Continue from the saved checkpoint when it matches the fetched list
        #[arg(long)]
        resume: bool,
    },

    /// Dispatch once to the synthetic test customer
    Test {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging first so configuration warnings are captured
    let _guard = init_logging()?;

    let config = AppConfig::load(&cli.config)?;
    tracing::info!("Starting outreach with {}", cli.config.display());

    let collaborators = build_collaborators(&config)?;
    let checkpoints = CheckpointStore::new(&config.state.checkpoint_path);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop requested, finishing the current step...");
            let _ = stop_tx.send(true);
        }
    });

    let mut dispatcher = Dispatcher::new(&config, collaborators, checkpoints, stop_rx);

    let summary = match cli.command {
        Command::Run { resume } => dispatcher
            .run(resume)
            .await
            .context("Dispatch run aborted")?,
        Command::Test { id, name, context } => {
            let defaults = &config.test_customer;
            let customer = Customer::new(
                id.unwrap_or_else(|| defaults.id.clone()),
                name.unwrap_or_else(|| defaults.name.clone()),
                context.unwrap_or_else(|| defaults.context.clone()),
            );
            dispatcher.run_test(customer).await
        }
    };

    log_summary(&summary);
    Ok(())
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    if !Path::new("data").exists() {
        fs::create_dir("data").context("Failed to create data directory")?;
    }

    // Clear previous session log
    let log_path = Path::new("data/session.log");
    if log_path.exists() {
        let _ = fs::remove_file(log_path);
    }

    let file_appender = tracing_appender::rolling::never("data", "session.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}

fn build_collaborators(config: &AppConfig) -> Result<Collaborators> {
    let services = &config.services;

    let source: Arc<dyn CustomerSource> = match (&services.customers.url, &services.customers.file) {
        (Some(url), _) => Arc::new(HttpCustomerSource::new(
            http_client(services.customers.timeout_secs)?,
            url,
        )),
        (None, Some(file)) => Arc::new(FileCustomerSource::new(file)),
        (None, None) => bail!("No customer source configured"),
    };

    let generator = LlmClient::new(&services.generator).context("Failed to configure generator")?;
    tracing::info!("Generator: {}", generator.provider().as_str());

    let sender = HttpSender::new(http_client(services.gateway.timeout_secs)?, &services.gateway.url);

    let tracker: Arc<dyn Tracker> = match (&services.tracker.url, &services.tracker.file) {
        (Some(url), _) => Arc::new(HttpTracker::new(
            http_client(services.tracker.timeout_secs)?,
            url,
        )),
        (None, Some(file)) => Arc::new(JsonlTracker::new(file)),
        (None, None) => Arc::new(JsonlTracker::new(DEFAULT_TRACKING_FILE)),
    };

    let mut observer = LoggingObserver::new();
    if let Some(path) = &config.state.status_log {
        observer = observer.with_file(path);
    }

    Ok(Collaborators {
        source,
        generator: Arc::new(generator),
        sender: Arc::new(sender),
        tracker,
        observer: Arc::new(observer),
        clock: Arc::new(SystemClock::new(config.business_hours.timezone)),
    })
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        "Run finished ({}): {} attempted, {} sent, {} failed",
        summary.state,
        summary.attempted,
        summary.sent,
        summary.failed
    );
}
