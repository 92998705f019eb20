use thiserror::Error;

/// Typed errors raised by pipeline stages and collaborators.
///
/// The orchestrator turns every one of them into a degraded HOLD.
/// Application edges wrap with `anyhow::Context` instead.
#[derive(Error, Debug)]
pub enum BotError {
    // -- External collaborators ---------------------------------------------
    #[error("advisory unavailable: {reason}")]
    AdvisoryUnavailable { reason: String },

    #[error("market data unavailable for {symbol} {timeframe}: {reason}")]
    MarketData {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    // -- Data ---------------------------------------------------------------
    #[error("item not scorable: {reason}")]
    Unscorable { reason: String },

    // -- Pipeline -----------------------------------------------------------
    #[error("{stage} stage failed: {reason}")]
    Stage { stage: &'static str, reason: String },

    #[error("model error: {reason}")]
    Model { reason: String },

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

impl BotError {
    pub fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        BotError::Stage {
            stage,
            reason: reason.into(),
        }
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;
