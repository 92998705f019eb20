//! Configuration management for FusionBot
//!
//! Loads from TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::features::IndicatorConfig;
use crate::strategy::StrategyParams;
use crate::types::Timeframe;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub advisory: AdvisoryConfig,
    pub market_data: MarketDataConfig,
    pub indicators: IndicatorsConfig,
    pub strategy: StrategySection,
    pub sentiment: SentimentConfig,
    pub execution: ExecutionConfig,
    pub persistence: PersistenceConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder_with_defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FUSIONBOT_*)
            .add_source(
                Environment::with_prefix("FUSIONBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bot.symbols"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Defaults only, no files or environment. Used by tests.
    pub fn defaults() -> Result<Self> {
        let config = Self::builder_with_defaults()?
            .build()
            .context("Failed to build default configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            // Bot defaults
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.symbols", vec!["BTCUSDT"])?
            .set_default("bot.base_timeframe", "15m")?
            .set_default("bot.interval_secs", 900)?
            .set_default("bot.run_once", false)?
            // Advisory defaults
            .set_default("advisory.api_url", "https://api.x.ai/v1/chat/completions")?
            .set_default("advisory.model", "grok-3-beta")?
            .set_default("advisory.timeout_secs", 15)?
            .set_default("advisory.temperature", 0.3)?
            .set_default("advisory.api_key_env", "ADVISORY_API_KEY")?
            .set_default("advisory.default_token_price", 0.01)?
            // Market data defaults
            .set_default("market_data.base_url", "https://fapi.binance.com")?
            .set_default("market_data.candle_limit", 150)?
            .set_default("market_data.max_retries", 3)?
            .set_default("market_data.retry_backoff_ms", 500)?
            .set_default("market_data.timeout_secs", 10)?
            // Indicator defaults
            .set_default("indicators.rsi_period", 14)?
            .set_default("indicators.ema_period", 14)?
            .set_default("indicators.macd_fast", 12)?
            .set_default("indicators.macd_slow", 26)?
            .set_default("indicators.bb_period", 20)?
            .set_default("indicators.bb_std", 2.0)?
            .set_default("indicators.divergence_window", 14)?
            .set_default("indicators.divergence_min_samples", 30)?
            // Strategy defaults
            .set_default("strategy.rsi_oversold", 30.0)?
            .set_default("strategy.rsi_overbought", 70.0)?
            .set_default("strategy.sentiment_bucket", 0.3)?
            .set_default("strategy.primary_tp_pct", 1.2)?
            .set_default("strategy.primary_sl_pct", 0.6)?
            .set_default("strategy.fallback_tp_pct", 1.5)?
            .set_default("strategy.fallback_sl_pct", 0.5)?
            .set_default("strategy.macd_override", 30.0)?
            .set_default("strategy.sentiment_override", 0.6)?
            .set_default("strategy.community_threshold", 0.3)?
            .set_default("strategy.model_window", 10)?
            .set_default("strategy.model_min_accuracy", 0.6)?
            // Sentiment defaults
            .set_default("sentiment.news_path", "./data/news.json")?
            .set_default("sentiment.community_path", "./data/community.json")?
            .set_default("sentiment.max_news_items", 6)?
            .set_default("sentiment.max_community_items", 30)?
            // Execution defaults
            .set_default("execution.mode", "simulated")?
            .set_default("execution.initial_balance", 1_000_000.0)?
            .set_default("execution.position_size", 1.0)?
            // Persistence defaults
            .set_default("persistence.trade_log_path", "./logs/simulation/simulated_trades.json")?
            .set_default("persistence.max_entries", 1000)?
            // Notification defaults
            .set_default("notify.enabled", true)?
            .set_default("notify.bot_token_env", "TELEGRAM_BOT_TOKEN")?
            .set_default("notify.chat_id_env", "TELEGRAM_CHAT_ID")?
            .set_default("notify.timeout_secs", 10)?
            // Logging defaults
            .set_default("logging.json", false)?;

        Ok(builder)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bot.symbols.is_empty() {
            bail!("bot.symbols must name at least one symbol");
        }
        if Timeframe::from_str(&self.bot.base_timeframe).is_none() {
            bail!("bot.base_timeframe '{}' is not supported", self.bot.base_timeframe);
        }
        if self.bot.interval_secs == 0 {
            bail!("bot.interval_secs must be positive");
        }
        if self.strategy.rsi_oversold >= self.strategy.rsi_overbought {
            bail!("strategy.rsi_oversold must be below strategy.rsi_overbought");
        }
        if self.strategy.model_window < 3 {
            bail!("strategy.model_window must be at least 3");
        }
        if self.persistence.max_entries == 0 {
            bail!("persistence.max_entries must be positive");
        }
        if self.indicators.macd_fast >= self.indicators.macd_slow {
            bail!("indicators.macd_fast must be below indicators.macd_slow");
        }
        Ok(())
    }

    pub fn base_timeframe(&self) -> Timeframe {
        Timeframe::from_str(&self.bot.base_timeframe).unwrap_or_default()
    }

    pub fn indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig {
            rsi_period: self.indicators.rsi_period,
            ema_period: self.indicators.ema_period,
            macd_fast: self.indicators.macd_fast,
            macd_slow: self.indicators.macd_slow,
            bb_period: self.indicators.bb_period,
            bb_std: self.indicators.bb_std,
            divergence_window: self.indicators.divergence_window,
            divergence_min_samples: self.indicators.divergence_min_samples,
        }
    }

    pub fn strategy_params(&self) -> StrategyParams {
        let s = &self.strategy;
        StrategyParams {
            rsi_oversold: s.rsi_oversold,
            rsi_overbought: s.rsi_overbought,
            sentiment_bucket: s.sentiment_bucket,
            primary_tp_pct: s.primary_tp_pct,
            primary_sl_pct: s.primary_sl_pct,
            fallback_tp_pct: s.fallback_tp_pct,
            fallback_sl_pct: s.fallback_sl_pct,
            macd_override: s.macd_override,
            sentiment_override: s.sentiment_override,
            community_threshold: s.community_threshold,
        }
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} symbols={:?} tf={} interval={}s mode={} model={}",
            self.bot.tag,
            self.bot.symbols,
            self.bot.base_timeframe,
            self.bot.interval_secs,
            self.execution.mode,
            self.advisory.model
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
