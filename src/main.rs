//! FusionBot - periodic decision runner
//!
//! Loads configuration, starts one pipeline task per configured symbol and
//! stops them on Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use fusionbot::advisory::ChatCompletionClient;
use fusionbot::config::AppConfig;
use fusionbot::logging::init_tracing;
use fusionbot::market_data::BinanceFuturesClient;
use fusionbot::notify;
use fusionbot::persistence::TradeLog;
use fusionbot::runner::{PipelineDeps, SymbolPipeline};
use fusionbot::sentiment::JsonFileFeed;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(config = %config, "🤖 FusionBot starting");

    let deps = PipelineDeps {
        candles: Arc::new(
            BinanceFuturesClient::new(&config.market_data).context("Failed to build market data client")?,
        ),
        news: Arc::new(JsonFileFeed::new(
            &config.sentiment.news_path,
            config.sentiment.max_news_items,
        )),
        community: Arc::new(JsonFileFeed::new(
            &config.sentiment.community_path,
            config.sentiment.max_community_items,
        )),
        advisory: Arc::new(
            ChatCompletionClient::new(&config.advisory).context("Failed to build advisory client")?,
        ),
        notifier: notify::from_config(&config.notify).context("Failed to build notifier")?,
        trade_log: Arc::new(TradeLog::new(
            &config.persistence.trade_log_path,
            config.persistence.max_entries,
        )),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = Duration::from_secs(config.bot.interval_secs);

    let mut handles = Vec::with_capacity(config.bot.symbols.len());
    for symbol in &config.bot.symbols {
        let pipeline = SymbolPipeline::new(symbol.clone(), &config, deps.clone());
        handles.push(tokio::spawn(pipeline.run(
            interval,
            config.bot.run_once,
            shutdown_rx.clone(),
        )));
    }

    if !config.bot.run_once {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("🛑 Ctrl-C received, stopping after the current cycle");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "❌ Pipeline task ended abnormally");
        }
    }

    info!("👋 FusionBot stopped");
    Ok(())
}
