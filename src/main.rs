//! # Studybell — study block scheduler with email reminders
//!
//! Schedules time-boxed study sessions and emails the owner a reminder ten
//! minutes before each one starts.
//!
//! Usage:
//!   studybell                          # Start with ~/.studybell/config.toml
//!   studybell --config ./dev.toml      # Custom config path
//!   studybell --port 9090              # Override the listen port

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use studybell_core::config::StudybellConfig;
use studybell_gateway::AppState;
use studybell_gateway::auth::HttpIdentityProvider;
use studybell_mailer::SmtpMailer;
use studybell_service::{BlockService, NotificationDispatcher};
use studybell_store::BlockStore;

#[derive(Parser)]
#[command(name = "studybell", version, about = "⏰ Studybell — study block reminders")]
struct Cli {
    /// Path to config file (default: ~/.studybell/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the gateway listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the gateway listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "studybell=debug,tower_http=debug"
    } else {
        "studybell=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => StudybellConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => StudybellConfig::load()?,
    };
    let host = cli.host.unwrap_or_else(|| config.gateway.host.clone());
    let port = cli.port.unwrap_or(config.gateway.port);

    if config.schedule.cron_secret.is_empty() {
        tracing::warn!(
            "⚠️ No dispatcher secret configured — /check-notifications will refuse all requests. \
             Set schedule.cron_secret or STUDYBELL_CRON_SECRET."
        );
    }

    // Open the block store
    let db_path = expand_path(&config.database.path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(BlockStore::open(std::path::Path::new(&db_path))?);
    tracing::info!("💾 Block store opened: {db_path} ({} blocks)", store.total_blocks()?);

    // Wire up the pipeline
    let sender: Arc<dyn studybell_mailer::ReminderSender> = Arc::new(SmtpMailer::new(
        config.mail.clone(),
        config.schedule.display_timezone,
    ));
    let service = BlockService::new(store.clone(), config.schedule.timezone);
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), sender.clone()));
    let identity = Arc::new(HttpIdentityProvider::new(&config.identity));

    // Built-in dispatcher loop; 0 means an external scheduler drives
    // /check-notifications instead
    if config.schedule.poll_interval_secs > 0 {
        let dispatcher = dispatcher.clone();
        let interval = config.schedule.poll_interval_secs;
        tokio::spawn(async move {
            studybell_service::run_loop(dispatcher, interval).await;
        });
    }

    let state = Arc::new(AppState {
        service,
        dispatcher,
        sender,
        identity,
        cron_secret: config.schedule.cron_secret.clone(),
    });

    studybell_gateway::start(state, &host, port).await
}
