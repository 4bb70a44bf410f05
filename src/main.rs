mod bot;
mod config;
mod conversation;
mod error;
mod matcher;
mod model;
mod notifier;
mod scheduler;
mod source;
mod storage;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::Transport;
use config::AppConfig;
use conversation::{ConversationRouter, PendingInputs};
use notifier::Notifier;
use notifier::telegram::TelegramNotifier;
use scheduler::Scheduler;
use source::PriceSource;
use source::esun::EsunGoldSource;
use source::retry::RetryingSource;
use storage::AlertStore;
use storage::sqlite::SqliteAlertStore;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("price source error")]
    Source,
    #[display("telegram error")]
    Telegram,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "gold-notifier", about = "E.SUN gold passbook price alert bot")]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telegram bot token
    #[arg(short, long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path).change_context(AppError::Config)?,
        None => AppConfig::default(),
    }
    .with_token(cli.token)
    .change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let data_dir = &config.general.data_dir;
    let db_path = format!("{data_dir}/gold-notifier.db");
    let store: Arc<dyn AlertStore> = Arc::new(
        SqliteAlertStore::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    // ── Price source ──────────────────────────────────────────────────────────
    let esun: Arc<dyn PriceSource> =
        Arc::new(EsunGoldSource::new(&config.source).change_context(AppError::Source)?);
    let source: Arc<dyn PriceSource> = Arc::new(RetryingSource::new(
        esun,
        Duration::from_secs(config.source.timeout_secs),
        Duration::from_millis(config.source.retry_backoff_ms),
    ));

    // ── Telegram ──────────────────────────────────────────────────────────────
    let bot = Bot::new(config.token());
    bot::authenticate(&bot)
        .await
        .change_context(AppError::Telegram)?;
    bot::register_commands(&bot).await;

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let router = Arc::new(ConversationRouter::new(
        Arc::clone(&store),
        Arc::clone(&source),
        Arc::new(PendingInputs::new()),
    ));

    // ── Tasks ─────────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
        Arc::clone(&source),
        Arc::clone(&store),
        notifier,
        Duration::from_secs(config.scheduler.interval_secs),
    );
    let scheduler_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    let transport = Transport::new(bot, router);
    let shutdown = transport.shutdown_token();
    let transport_handle = tokio::spawn(transport.run());

    info!("bot started");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();
    if let Ok(stopped) = shutdown.shutdown() {
        let _ = tokio::time::timeout(Duration::from_secs(5), stopped).await;
    }

    for handle in [scheduler_handle, transport_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
