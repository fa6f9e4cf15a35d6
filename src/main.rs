//! Main entry point for the launch sniper.
//!
//! Loads configuration, subscribes to the bundle feed and hands every event to
//! the purchase pipeline until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use launch_sniper::blacklist::BlacklistStore;
use launch_sniper::ledger;
use launch_sniper::pipeline::{
    CandidateFilter, DirectAttempt, InFlightRegistry, PurchaseAttempt, PurchaseExecutor, QuoteAcquirer,
    SnipePipeline, SubprocessAttempt,
};
use launch_sniper::transport::FeedClient;
use launch_sniper::venue::{HttpSwapVenue, SwapVenue, ThrottledVenue};
use launch_sniper::{SniperConfig, TradeRoute};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "snipebot.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    Ok(guard)
}

fn build_attempt(config: &SniperConfig) -> Arc<dyn PurchaseAttempt> {
    match &config.trade_route {
        TradeRoute::Direct => {
            let venue: Arc<dyn SwapVenue> = Arc::new(ThrottledVenue::new(
                HttpSwapVenue::new(config.venue_config()),
                config.venue_max_rps,
            ));
            let quotes = QuoteAcquirer::new(Arc::clone(&venue), config.retry_schedule());
            Arc::new(DirectAttempt::new(venue, quotes, config.await_confirmation))
        }
        TradeRoute::Subprocess(command) => {
            info!("Buying through external command: {}", command.program);
            Arc::new(SubprocessAttempt::new(command.clone(), config.subprocess_env()))
        }
    }
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = signal::ctrl_c() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        "SIGINT"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = SniperConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(&config.log_dir)?;

    info!(
        "Starting snipebot | ws={} | base={} | buy={} | slippage={:?}",
        config.feed_urls.head, config.base_token, config.buy_amount, config.slippage
    );
    info!("Logging to {}", config.log_dir.join("snipebot.log").display());

    let blacklist = Arc::new(BlacklistStore::new(&config.blacklist_path).load()?);
    info!("Loaded {} blacklist entries", blacklist.len());

    let ledger = ledger::open(&config.ledger).await.context("Failed to open purchase ledger")?;

    let executor = Arc::new(PurchaseExecutor::new(
        build_attempt(&config),
        Arc::clone(&ledger),
        config.executor_config(),
    ));
    let pipeline = SnipePipeline::new(CandidateFilter::new(blacklist, InFlightRegistry::new()), executor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (client, mut events) = FeedClient::new(config.feed_config());
    let feed = tokio::spawn(async move { client.run(shutdown_rx).await });

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Some(event) => {
                    for arg in &event.args {
                        pipeline.ingest(&event.name, arg);
                    }
                }
                None => {
                    warn!("Feed client stopped delivering events");
                    break;
                }
            },
            name = &mut signal => {
                info!("Received {}, shutting down snipebot.", name);
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    match feed.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Feed client failed: {:#}", e),
        Err(e) => error!("Feed task panicked: {}", e),
    }

    let in_flight = pipeline.registry().len();
    if in_flight > 0 {
        warn!("Exiting with {} purchase(s) still in flight", in_flight);
    }
    ledger.close().await.context("Failed to close purchase ledger")?;

    info!("Shutdown complete");
    Ok(())
}
