//! Fallback Strategy Evaluator
//!
//! Runs when the primary advisory ends in HOLD. Asks for a one-word second
//! opinion from base-timeframe indicators only, then gates it on the 1h/4h
//! MACD trend. A strong local MACD or strong sentiment may override a
//! disagreeing higher-timeframe trend.

use std::fmt;

use crate::advisory::{confirmation_prompt, Advisory, AdvisoryClient};
use crate::errors::{BotError, BotResult};
use crate::features::IndicatorSnapshot;
use crate::types::{SentimentScore, Signal};

use super::interpreter::{is_error_reply, rationale, resolve_signal};
use super::{DecisionSource, StrategyDecision, StrategyParams};

/// Higher-timeframe snapshots; a missing one counts as flat MACD
#[derive(Debug, Clone, Default)]
pub struct HigherTimeframes {
    pub h1: Option<IndicatorSnapshot>,
    pub h4: Option<IndicatorSnapshot>,
}

impl HigherTimeframes {
    pub fn new(h1: Option<IndicatorSnapshot>, h4: Option<IndicatorSnapshot>) -> Self {
        Self { h1, h4 }
    }

    fn macds(&self) -> (f64, f64) {
        (
            self.h1.as_ref().map_or(0.0, |s| s.macd),
            self.h4.as_ref().map_or(0.0, |s| s.macd),
        )
    }

    pub fn trend_up(&self) -> bool {
        let (h1, h4) = self.macds();
        h1 > 0.0 && h4 > 0.0
    }

    pub fn trend_down(&self) -> bool {
        let (h1, h4) = self.macds();
        h1 < 0.0 && h4 < 0.0
    }
}

/// Two-tier confirmation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    AwaitPrimary,
    AwaitSecondary,
    /// Second opinion agrees with the higher-timeframe trend
    Confirmed,
    /// Disagrees, but local MACD or sentiment is strong enough
    Overridden,
    Held,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConfirmationState::Confirmed | ConfirmationState::Overridden | ConfirmationState::Held
        )
    }

    pub fn accepts(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed | ConfirmationState::Overridden)
    }

    /// Primary result arrives
    pub fn on_primary(self, primary: Signal) -> Self {
        match self {
            ConfirmationState::AwaitPrimary if primary.is_hold() => ConfirmationState::AwaitSecondary,
            ConfirmationState::AwaitPrimary => ConfirmationState::Confirmed,
            other => other,
        }
    }

    /// Secondary signal arrives, gated on the trend
    pub fn on_secondary(
        self,
        secondary: Signal,
        base: &IndicatorSnapshot,
        higher: &HigherTimeframes,
        sentiment: SentimentScore,
        params: &StrategyParams,
    ) -> Self {
        if self != ConfirmationState::AwaitSecondary {
            return self;
        }

        let agrees = match secondary {
            Signal::Long => higher.trend_up(),
            Signal::Short => higher.trend_down(),
            Signal::Hold => return ConfirmationState::Held,
        };

        if agrees {
            ConfirmationState::Confirmed
        } else if base.macd.abs() > params.macd_override
            || sentiment.value().abs() > params.sentiment_override
        {
            ConfirmationState::Overridden
        } else {
            ConfirmationState::Held
        }
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationState::AwaitPrimary => write!(f, "awaiting primary"),
            ConfirmationState::AwaitSecondary => write!(f, "awaiting secondary"),
            ConfirmationState::Confirmed => write!(f, "confirmed by higher timeframes"),
            ConfirmationState::Overridden => write!(f, "override against higher timeframes"),
            ConfirmationState::Held => write!(f, "held"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackEvaluator {
    params: StrategyParams,
}

impl FallbackEvaluator {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    /// Second-opinion decision for a HOLD primary result
    pub async fn evaluate(
        &self,
        advisory: &dyn AdvisoryClient,
        sentiment: SentimentScore,
        base: &IndicatorSnapshot,
        higher: &HigherTimeframes,
    ) -> BotResult<StrategyDecision> {
        let state = ConfirmationState::AwaitPrimary.on_primary(Signal::Hold);

        let reply = advisory.request(&confirmation_prompt(base, sentiment)).await;
        let text = match reply {
            Advisory::Text(t) if !t.trim().is_empty() && !is_error_reply(&t) => t,
            Advisory::Text(t) => {
                return Err(BotError::AdvisoryUnavailable {
                    reason: format!("second opinion unusable: '{}'", t.trim()),
                })
            }
            Advisory::Unavailable { reason } => return Err(BotError::AdvisoryUnavailable { reason }),
        };

        let secondary = resolve_signal(&text);
        let state = state.on_secondary(secondary, base, higher, sentiment, &self.params);
        let (h1, h4) = higher.macds();

        tracing::info!(
            secondary = %secondary,
            state = %state,
            macd_1h = h1,
            macd_4h = h4,
            macd_base = base.macd,
            "🔁 Fallback evaluated"
        );

        let summary = format!(
            "{}, fallback: {} {}",
            rationale(base, sentiment, &self.params),
            secondary,
            state
        );

        let signal = if state.accepts() { secondary } else { Signal::Hold };
        Ok(StrategyDecision::new(
            signal,
            self.params.fallback_tp_pct,
            self.params.fallback_sl_pct,
            base.close,
            summary,
            DecisionSource::Fallback,
        ))
    }
}
