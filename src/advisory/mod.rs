//! AI Advisory Client
//!
//! Sends indicator/sentiment prompts to an OpenAI-compatible chat completion
//! endpoint and hands back the raw reply. The reply is untrusted free text;
//! only the strategy interpreter reads it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AdvisoryConfig;
use crate::errors::BotResult;
use crate::features::IndicatorSnapshot;
use crate::sentiment::NewsItem;
use crate::types::SentimentScore;

const SYSTEM_PROMPT: &str =
    "You are a professional crypto futures trader. Answer concisely in the requested format.";

/// Raw advisory reply
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    Text(String),
    Unavailable { reason: String },
}

impl Advisory {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Advisory::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Advisory::Text(t) => Some(t.as_str()),
            Advisory::Unavailable { .. } => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    async fn request(&self, prompt: &str) -> Advisory;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

/// `usage` block of a chat completion response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Per-model token prices in USD per 1K tokens
#[derive(Debug, Clone)]
pub struct TokenPricing {
    prices: HashMap<String, f64>,
    default_per_1k: f64,
}

impl TokenPricing {
    pub fn new(prices: HashMap<String, f64>, default_per_1k: f64) -> Self {
        Self {
            prices,
            default_per_1k,
        }
    }

    /// Exact model name first, then the longest configured prefix
    pub fn price_per_1k(&self, model: &str) -> f64 {
        let model = model.to_lowercase();
        if let Some(price) = self.prices.get(&model) {
            return *price;
        }
        self.prices
            .iter()
            .filter(|(name, _)| model.starts_with(name.to_lowercase().as_str()))
            .max_by_key(|(name, _)| name.len())
            .map_or(self.default_per_1k, |(_, price)| *price)
    }

    pub fn cost(&self, model: &str, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.price_per_1k(model)
    }
}

/// Chat completion client (x.ai / OpenAI wire format)
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f64,
    api_key: Option<String>,
    pricing: TokenPricing,
    tokens_used: AtomicU64,
}

impl ChatCompletionClient {
    pub fn new(config: &AdvisoryConfig) -> BotResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "🤖 Advisory API key not set, every advisory request will be unavailable"
            );
        }
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &AdvisoryConfig, api_key: Option<String>) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            pricing: TokenPricing::new(config.token_prices.clone(), config.default_token_price),
            tokens_used: AtomicU64::new(0),
        })
    }

    /// Tokens reported by the endpoint since construction
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    fn track_usage(&self, usage: TokenUsage) {
        let total = self.tokens_used.fetch_add(usage.total_tokens, Ordering::Relaxed) + usage.total_tokens;
        info!(
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            tokens = usage.total_tokens,
            cost_usd = %format!("{:.4}", self.pricing.cost(&self.model, usage.total_tokens)),
            session_tokens = total,
            session_cost_usd = %format!("{:.4}", self.pricing.cost(&self.model, total)),
            "🪙 Advisory token usage"
        );
    }

    async fn send(&self, api_key: &str, prompt: &str) -> Result<String, String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    format!("request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("advisory endpoint returned {}", status));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed advisory response: {}", e))?;

        if let Some(usage) = body.usage {
            self.track_usage(usage);
        }

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err("empty advisory response".to_string());
        }
        Ok(content)
    }
}

#[async_trait]
impl AdvisoryClient for ChatCompletionClient {
    async fn request(&self, prompt: &str) -> Advisory {
        let Some(api_key) = self.api_key.as_deref() else {
            return Advisory::unavailable("advisory API key not configured");
        };

        match self.send(api_key, prompt).await {
            Ok(text) => {
                debug!(chars = text.len(), "🤖 Advisory reply received");
                Advisory::Text(text)
            }
            Err(reason) => {
                warn!(reason = %reason, "🤖 Advisory request failed");
                Advisory::Unavailable { reason }
            }
        }
    }
}

fn fmt_rsi(snapshot: &IndicatorSnapshot) -> String {
    snapshot
        .rsi
        .map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Primary prompt: full indicator set, sentiment and headlines
pub fn primary_prompt(
    symbol: &str,
    snapshot: &IndicatorSnapshot,
    sentiment: SentimentScore,
    headlines: &[NewsItem],
) -> String {
    let news = if headlines.is_empty() {
        "- (no headlines)".to_string()
    } else {
        headlines
            .iter()
            .map(|n| format!("- {}", n.title))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Market snapshot for {symbol} futures.\n\n\
         - Close: {close:.2}\n\
         - RSI: {rsi}\n\
         - MACD: {macd:.4}\n\
         - EMA: {ema:.2}\n\
         - TEMA: {tema:.2}\n\
         - Bollinger position: {bb}\n\
         - RSI divergence: {div}\n\
         - Sentiment score: {sentiment}\n\n\
         Headlines:\n{news}\n\n\
         Reply in exactly this format:\n\
         Direction: LONG / SHORT / HOLD\n\
         Take profit: <percent>\n\
         Stop loss: <percent>\n\
         Reason: <one line>",
        symbol = symbol,
        close = snapshot.close,
        rsi = fmt_rsi(snapshot),
        macd = snapshot.macd,
        ema = snapshot.ema,
        tema = snapshot.tema,
        bb = snapshot.bollinger,
        div = snapshot.divergence,
        sentiment = sentiment,
        news = news,
    )
}

/// Second-opinion prompt: base indicators and sentiment only, one-word answer
pub fn confirmation_prompt(snapshot: &IndicatorSnapshot, sentiment: SentimentScore) -> String {
    format!(
        "Technical indicators:\n\
         RSI: {rsi}, BB: {bb}, EMA: {ema:.2}, TEMA: {tema:.2}, MACD: {macd:.4}, divergence: {div}\n\
         Sentiment: {sentiment}\n\n\
         Answer with exactly one word: LONG, SHORT or HOLD.",
        rsi = fmt_rsi(snapshot),
        bb = snapshot.bollinger,
        ema = snapshot.ema,
        tema = snapshot.tema,
        macd = snapshot.macd,
        div = snapshot.divergence,
        sentiment = sentiment,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::features::{BollingerPosition, Divergence};
    use crate::sentiment::Language;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: Some(28.5),
            ema: 100.0,
            tema: 101.0,
            macd: -12.0,
            bollinger: BollingerPosition::Lower,
            divergence: Divergence::Bullish,
            close: 99.5,
            sample_count: 150,
        }
    }

    #[test]
    fn test_primary_prompt_contains_inputs() {
        let news = vec![NewsItem::new("비트코인 급등", "", Language::Korean)];
        let prompt = primary_prompt("BTCUSDT", &snapshot(), SentimentScore::new(0.4), &news);
        assert!(prompt.contains("BTCUSDT"));
        assert!(prompt.contains("RSI: 28.50"));
        assert!(prompt.contains("Bollinger position: lower"));
        assert!(prompt.contains("- 비트코인 급등"));
        assert!(prompt.contains("Sentiment score: 0.40"));
    }

    #[test]
    fn test_confirmation_prompt_has_no_headlines() {
        let prompt = confirmation_prompt(&snapshot(), SentimentScore::NEUTRAL);
        assert!(prompt.contains("one word"));
        assert!(!prompt.contains("Headlines"));
    }

    #[test]
    fn test_prompt_marks_missing_rsi() {
        let snap = IndicatorSnapshot::insufficient(100.0, 3);
        assert!(confirmation_prompt(&snap, SentimentScore::NEUTRAL).contains("RSI: n/a"));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let cfg = AppConfig::defaults().unwrap();
        let client = ChatCompletionClient::with_key(&cfg.advisory, None).unwrap();
        let reply = client.request("anything").await;
        assert!(matches!(reply, Advisory::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.advisory.api_url = "http://127.0.0.1:9/v1/chat/completions".to_string();
        cfg.advisory.timeout_secs = 2;
        let client = ChatCompletionClient::with_key(&cfg.advisory, Some("key".to_string())).unwrap();
        let reply = client.request("anything").await;
        assert!(matches!(reply, Advisory::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out() {
        // Accepts the connection, never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cfg = AppConfig::defaults().unwrap();
        cfg.advisory.api_url = format!("http://{}/v1/chat/completions", addr);
        cfg.advisory.timeout_secs = 1;
        let client = ChatCompletionClient::with_key(&cfg.advisory, Some("key".to_string())).unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(10), client.request("anything"))
            .await
            .expect("client timeout must fire first");
        assert_eq!(reply, Advisory::unavailable("request timed out"));
        drop(listener);
    }

    #[test]
    fn test_response_shape_parses() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" Direction: LONG "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some(" Direction: LONG ")
        );
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_usage_block_parses() {
        let body = r#"{
            "choices":[{"message":{"content":"HOLD"}}],
            "usage":{"prompt_tokens":812,"completion_tokens":64,"total_tokens":876}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.usage,
            Some(TokenUsage {
                prompt_tokens: 812,
                completion_tokens: 64,
                total_tokens: 876
            })
        );
    }

    #[test]
    fn test_token_cost_per_model() {
        let cfg = AppConfig::defaults().unwrap();
        let pricing = TokenPricing::new(cfg.advisory.token_prices, cfg.advisory.default_token_price);

        assert!((pricing.cost("gpt-4", 1_500) - 0.045).abs() < 1e-12);
        assert!((pricing.cost("gpt-3.5-turbo", 1_000) - 0.002).abs() < 1e-12);
        // Versioned names fall back to their family price
        assert!((pricing.cost("grok-3-beta", 2_000) - 0.04).abs() < 1e-12);
        assert_eq!(pricing.cost("finbert", 10_000), 0.0);
        // Unknown models use the default price
        assert!((pricing.cost("mystery-model", 1_000) - 0.01).abs() < 1e-12);
        assert_eq!(pricing.cost("gpt-4", 0), 0.0);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let prices = [("gpt-4".to_string(), 0.03), ("gpt-4o".to_string(), 0.005)]
            .into_iter()
            .collect();
        let pricing = TokenPricing::new(prices, 0.01);
        assert_eq!(pricing.price_per_1k("gpt-4o-mini"), 0.005);
        assert_eq!(pricing.price_per_1k("GPT-4-turbo"), 0.03);
    }

    #[test]
    fn test_usage_is_accumulated() {
        let cfg = AppConfig::defaults().unwrap();
        let client = ChatCompletionClient::with_key(&cfg.advisory, None).unwrap();
        client.track_usage(TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        });
        client.track_usage(TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 10,
            total_tokens: 60,
        });
        assert_eq!(client.tokens_used(), 180);
    }
}
