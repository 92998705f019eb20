//! Market data - Binance USDT-M futures klines
//!
//! Fetches closed candles over REST with bounded retries. Exhausted retries
//! yield an empty window; the indicator layer turns that into
//! insufficient-data markers.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MarketDataConfig;
use crate::errors::{BotError, BotResult};
use crate::types::{Candle, Timeframe};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles in chronological order, empty when unavailable
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle>;
}

#[derive(Debug, Clone)]
pub struct BinanceFuturesClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl BinanceFuturesClient {
    pub fn new(config: &MarketDataConfig) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn klines_url(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> String {
        format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.to_uppercase(),
            timeframe.interval(),
            limit
        )
    }

    async fn fetch_once(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> BotResult<Vec<Candle>> {
        let url = self.klines_url(symbol, timeframe, limit);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(BotError::MarketData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                reason: format!("Binance API returned error: {}", response.status()),
            });
        }

        // [[open_time, open, high, low, close, volume, close_time, ...], ...]
        let klines: Vec<Vec<serde_json::Value>> = response.json().await?;
        Ok(closed_only(parse_klines(klines), Utc::now().timestamp_millis()))
    }
}

/// Drop the still-forming candle Binance returns last
pub fn closed_only(mut candles: Vec<Candle>, now_ms: i64) -> Vec<Candle> {
    candles.retain(|c| c.close_time <= now_ms);
    candles
}

/// Convert raw kline rows, dropping malformed ones
pub fn parse_klines(klines: Vec<Vec<serde_json::Value>>) -> Vec<Candle> {
    klines
        .into_iter()
        .filter_map(|kline| {
            if kline.len() < 7 {
                return None;
            }

            let open_time = kline[0].as_i64()?;
            let open: f64 = kline[1].as_str()?.parse().ok()?;
            let high: f64 = kline[2].as_str()?.parse().ok()?;
            let low: f64 = kline[3].as_str()?.parse().ok()?;
            let close: f64 = kline[4].as_str()?.parse().ok()?;
            let volume: f64 = kline[5].as_str()?.parse().ok()?;
            let close_time = kline[6].as_i64()?;

            Some(Candle {
                open_time,
                close_time,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}

#[async_trait]
impl CandleSource for BinanceFuturesClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        for attempt in 1..=self.max_retries {
            match self.fetch_once(symbol, timeframe, limit).await {
                Ok(candles) => {
                    info!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        count = candles.len(),
                        "📥 Candles fetched"
                    );
                    return candles;
                }
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "⚠️ Candle fetch failed"
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                }
            }
        }

        warn!(symbol = %symbol, timeframe = %timeframe, "❌ Candle fetch exhausted retries");
        Vec::new()
    }
}
