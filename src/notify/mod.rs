//! Notification sink
//!
//! Fire-and-forget decision messages. Delivery failures are logged and
//! swallowed.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::errors::BotResult;
use crate::execution::ExecutionOutcome;
use crate::strategy::StrategyDecision;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Used when notifications are disabled or unconfigured
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, text: &str) {
        debug!(chars = text.len(), "🔕 Notification suppressed");
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Telegram Bot API `sendMessage` with HTML parse mode
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String, timeout_secs: u64) -> BotResult<Self> {
        Self::with_api_base(TELEGRAM_API, bot_token, chat_id, timeout_secs)
    }

    pub fn with_api_base(
        api_base: &str,
        bot_token: String,
        chat_id: String,
        timeout_secs: u64,
    ) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    async fn send(&self, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;

        if !response.status().is_success() {
            return Err(format!("telegram returned {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        match self.send(text).await {
            Ok(()) => info!("📨 Telegram notification sent"),
            Err(e) => warn!(error = %e, "📨 Telegram notification failed"),
        }
    }
}

/// Telegram when enabled and both env vars are set, otherwise no-op
pub fn from_config(config: &NotifyConfig) -> BotResult<Arc<dyn Notifier>> {
    if !config.enabled {
        return Ok(Arc::new(NoopNotifier));
    }

    let token = std::env::var(&config.bot_token_env).ok().filter(|v| !v.trim().is_empty());
    let chat = std::env::var(&config.chat_id_env).ok().filter(|v| !v.trim().is_empty());

    match (token, chat) {
        (Some(token), Some(chat)) => Ok(Arc::new(TelegramNotifier::new(token, chat, config.timeout_secs)?)),
        _ => {
            warn!(
                token_env = %config.bot_token_env,
                chat_env = %config.chat_id_env,
                "📨 Telegram credentials missing, notifications disabled"
            );
            Ok(Arc::new(NoopNotifier))
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML message for one decision
pub fn format_decision(symbol: &str, decision: &StrategyDecision, outcome: &ExecutionOutcome) -> String {
    let result = match outcome {
        ExecutionOutcome::Skipped => "skipped".to_string(),
        ExecutionOutcome::Recorded { .. } => "signal only".to_string(),
        ExecutionOutcome::Simulated(fill) => format!(
            "{} pnl {:.2}, balance {:.2}",
            if fill.win { "✅ WIN" } else { "❌ LOSS" },
            fill.pnl,
            fill.balance
        ),
    };

    format!(
        "<b>📈 {symbol} {signal}</b>\n\
         Entry: {entry:.2}\n\
         TP: {tp:.2}% / SL: {sl:.2}%\n\
         Source: {source}\n\
         Result: {result}\n\
         <i>{rationale}</i>",
        symbol = escape_html(symbol),
        signal = decision.signal,
        entry = decision.entry_price,
        tp = decision.take_profit_pct,
        sl = decision.stop_loss_pct,
        source = decision.source,
        result = result,
        rationale = escape_html(&decision.rationale_summary),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::DecisionSource;
    use crate::types::Signal;

    #[test]
    fn test_format_escapes_rationale() {
        let d = StrategyDecision::new(
            Signal::Long,
            1.2,
            0.6,
            27_500.0,
            "RSI oversold (<30)",
            DecisionSource::Primary,
        );
        let text = format_decision("BTCUSDT", &d, &ExecutionOutcome::Skipped);
        assert!(text.contains("<b>📈 BTCUSDT LONG</b>"));
        assert!(text.contains("RSI oversold (&lt;30)"));
        assert!(text.contains("TP: 1.20% / SL: 0.60%"));
    }

    #[tokio::test]
    async fn test_disabled_config_is_noop() {
        let cfg = NotifyConfig {
            enabled: false,
            bot_token_env: "UNUSED".to_string(),
            chat_id_env: "UNUSED".to_string(),
            timeout_secs: 1,
        };
        let notifier = from_config(&cfg).unwrap();
        notifier.notify("hello").await;
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = TelegramNotifier::with_api_base("http://127.0.0.1:9", "t".into(), "1".into(), 1).unwrap();
        notifier.notify("hello").await;
    }

    #[tokio::test]
    async fn test_silent_endpoint_is_bounded() {
        // Accepts the connection, never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let notifier = TelegramNotifier::with_api_base(&base, "t".into(), "1".into(), 1).unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(10), notifier.notify("hello")).await;
        assert!(finished.is_ok());
        drop(listener);
    }
}
