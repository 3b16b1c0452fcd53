/// volley-live: Live Odds Observer
///
/// What it does:
///   1. Every minute pulls today's volleyball fixtures and their pre-match odds
///   2. Keeps fixtures with a clear favorite (odds at or under the ceiling)
///   3. Watches each one live: favorite loses set 1 while its odds drift up → signal
///   4. Records who took set 2, Telegram alert to the subscribed chat
///
/// What it does NOT do: place bets
///
/// Run:
///   cargo run --bin live-observer

mod config;
mod feed_db;
mod http_api;
mod statistics;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bet_api::BetApiClient;
use dotenv::dotenv;
use live_monitor::{FixtureSource, LiveFeed, Notifier, NotifyError, Recipient, ResultStore, Scheduler, TaskContext};
use logger::EventLogger;
use std::env;
use std::fs::File;
use std::sync::Arc;
use telegram::{run_subscription_listener, TelegramClient, TelegramNotifier};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::feed_db::{DbConfig, SqliteStore};
use crate::http_api::{start_http_server, HttpState};
use crate::statistics::run_statistics_job;

/// Fallback when no Telegram token is configured.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: Recipient, text: &str) -> Result<(), NotifyError> {
        info!(chat_id = to.chat_id(), "notification (telegram disabled):\n{text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cfg = AppConfig::from_env()?;

    info!("=== volley-live observer ===");
    info!("Mode: OBSERVE ONLY (no bets)");
    info!(
        "Favorite ceiling {:.2}, live floor {:.2}, poll {}s, lifetime {}m",
        cfg.monitor.favorite_max_odds,
        cfg.monitor.live_min_favorite_odds,
        cfg.monitor.poll_interval.as_secs(),
        cfg.monitor.task_lifetime.as_secs() / 60,
    );
    info!("Logs: {}", cfg.log_dir.display());

    // Single instance lock
    let lock_file_path = env::temp_dir().join("volley_live_observer.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of live-observer is already running! Exiting.");
            return Ok(());
        }
    };

    let events = Arc::new(EventLogger::new(&cfg.log_dir));
    let store = SqliteStore::open(DbConfig { path: cfg.db_path.to_string_lossy().into_owned() });
    info!("Results DB: {}", cfg.db_path.display());

    let feed = Arc::new(BetApiClient::new(cfg.bet_api.clone()).context("bet api client")?);
    let stop = CancellationToken::new();

    let (recipient_tx, recipient_rx) = watch::channel(cfg.telegram_chat_id.map(Recipient));
    let notifier: Arc<dyn Notifier> = match &cfg.telegram_token {
        Some(token) => {
            let client = TelegramClient::new(token.clone())?;
            match client.get_me().await {
                Ok(bot_id) => info!(bot_id, "telegram bot online"),
                Err(e) => warn!("telegram getMe failed: {e:#}"),
            }
            tokio::spawn(run_subscription_listener(client.clone(), recipient_tx, stop.clone()));
            Arc::new(TelegramNotifier::new(client))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, signals are only logged");
            Arc::new(LogNotifier)
        }
    };

    let ctx = TaskContext {
        feed:     feed.clone() as Arc<dyn LiveFeed>,
        store:    Arc::new(store.clone()) as Arc<dyn ResultStore>,
        notifier: notifier.clone(),
        events,
        config:   Arc::new(cfg.monitor.clone()),
    };
    let scheduler = Arc::new(Scheduler::new(feed as Arc<dyn FixtureSource>, ctx, recipient_rx.clone()));

    let http_state = HttpState {
        store:       store.clone(),
        api_version: cfg.api_version.clone(),
        utc_offset:  cfg.monitor.utc_offset,
    };
    let http_stop = stop.clone();
    let bind = cfg.http_bind;
    tokio::spawn(async move {
        if let Err(e) = start_http_server(http_state, bind, http_stop).await {
            warn!("http server stopped: {e:#}");
        }
    });

    tokio::spawn(run_statistics_job(
        store,
        notifier,
        recipient_rx,
        cfg.monitor.utc_offset,
        cfg.stats_hour,
        stop.clone(),
    ));

    let runner = {
        let scheduler = scheduler.clone();
        let stop = stop.clone();
        tokio::spawn(async move { scheduler.run(stop).await })
    };
    info!("🚀 READY: scheduler running every {}s", cfg.monitor.scheduler_interval.as_secs());

    tokio::signal::ctrl_c().await.context("listen for ctrl-c")?;
    info!("Shutdown requested, cancelling tasks...");
    stop.cancel();
    if let Err(e) = runner.await {
        warn!("scheduler loop ended abnormally: {e}");
    }

    let reports = scheduler.shutdown().await;
    for r in &reports {
        info!(fixture = %r.fixture_id, phase = %r.phase, polls = r.polls, "task stopped");
    }
    info!("Stopped {} monitoring task(s). Bye.", reports.len());
    Ok(())
}
