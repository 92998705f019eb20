//! Configuration section types

use serde::Deserialize;
use std::collections::HashMap;

use crate::execution::ExecutionMode;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot version tag for logging
    pub tag: String,
    /// Futures symbols to run pipelines for (e.g. BTCUSDT)
    pub symbols: Vec<String>,
    /// Base decision timeframe (15m)
    pub base_timeframe: String,
    /// Seconds between decision cycles
    pub interval_secs: u64,
    /// Run a single cycle per symbol and exit
    pub run_once: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryConfig {
    /// OpenAI-compatible chat completion endpoint
    pub api_url: String,
    /// Model name sent in the payload
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f64,
    /// Environment variable holding the bearer key
    pub api_key_env: String,
    /// USD per 1K tokens, keyed by model name or model-name prefix
    #[serde(default = "default_token_prices")]
    pub token_prices: HashMap<String, f64>,
    /// USD per 1K tokens for models missing from `token_prices`
    pub default_token_price: f64,
}

fn default_token_prices() -> HashMap<String, f64> {
    [
        ("gpt-4", 0.03),
        ("gpt-3.5-turbo", 0.002),
        ("grok-3", 0.02),
        ("finbert", 0.0),
    ]
    .into_iter()
    .map(|(model, price)| (model.to_string(), price))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Binance USDT-M futures REST base URL
    pub base_url: String,
    /// Candles requested per timeframe
    pub candle_limit: usize,
    /// Attempts per fetch before giving up
    pub max_retries: u32,
    /// Backoff step between attempts in milliseconds
    pub retry_backoff_ms: u64,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorsConfig {
    pub rsi_period: usize,
    pub ema_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    /// Rolling window for divergence extrema
    pub divergence_window: usize,
    /// Minimum candles before divergence is evaluated
    pub divergence_min_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Sentiment polarity bucket threshold
    pub sentiment_bucket: f64,
    pub primary_tp_pct: f64,
    pub primary_sl_pct: f64,
    pub fallback_tp_pct: f64,
    pub fallback_sl_pct: f64,
    /// |MACD(base)| above this lets a signal fight the higher-frame trend
    pub macd_override: f64,
    /// |sentiment| above this lets a signal fight the higher-frame trend
    pub sentiment_override: f64,
    /// Community veto threshold
    pub community_threshold: f64,
    /// Feature window length for the model correction stage
    pub model_window: usize,
    /// Minimum training accuracy before the model may speak
    pub model_min_accuracy: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// JSON file with news items written by the news collector
    pub news_path: String,
    /// JSON file with community posts written by the community collector
    pub community_path: String,
    pub max_news_items: usize,
    pub max_community_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Starting simulated balance
    pub initial_balance: f64,
    /// Units per simulated trade
    pub position_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Trade log JSON file
    pub trade_log_path: String,
    /// Most recent entries retained
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub bot_token_env: String,
    pub chat_id_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
