//! Strategy decision pipeline
//!
//! Turns one cycle of indicators, sentiment and advisory text into a single
//! `StrategyDecision`:
//! - interpreter: advisory text -> decision
//! - fallback: second opinion gated by the higher-timeframe trend
//! - correction: rolling-window model that may turn HOLD into a direction
//! - community: veto toward HOLD when the crowd disagrees
//! - orchestrator: runs the stages in order with per-stage fault isolation
//!
//! A HOLD decision always carries zero take-profit and stop-loss.

pub mod community;
pub mod correction;
pub mod fallback;
pub mod interpreter;
pub mod orchestrator;

pub use community::adjust;
pub use correction::{FeatureVector, FeatureWindow, ModelCorrection, SignalModel, TrendClassifier};
pub use fallback::{ConfirmationState, FallbackEvaluator, HigherTimeframes};
pub use interpreter::{extract_level, interpret, resolve_signal};
pub use orchestrator::{CycleInputs, StrategyOrchestrator};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Signal;

/// Thresholds and TP/SL pairs for the decision stages
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Sentiment polarity bucket threshold for rationale text
    pub sentiment_bucket: f64,
    /// TP/SL when the primary advisory decides
    pub primary_tp_pct: f64,
    pub primary_sl_pct: f64,
    /// TP/SL for fallback and model decisions
    pub fallback_tp_pct: f64,
    pub fallback_sl_pct: f64,
    pub macd_override: f64,
    pub sentiment_override: f64,
    pub community_threshold: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            sentiment_bucket: 0.3,
            primary_tp_pct: 1.2,
            primary_sl_pct: 0.6,
            fallback_tp_pct: 1.5,
            fallback_sl_pct: 0.5,
            macd_override: 30.0,
            sentiment_override: 0.6,
            community_threshold: 0.3,
        }
    }
}

/// Which stage produced the decision, handed to the execution router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Primary,
    Fallback,
    Model,
    Degraded,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Primary => write!(f, "primary"),
            DecisionSource::Fallback => write!(f, "fallback"),
            DecisionSource::Model => write!(f, "model"),
            DecisionSource::Degraded => write!(f, "degraded"),
        }
    }
}

/// Final output of one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub signal: Signal,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub entry_price: f64,
    pub rationale_summary: String,
    pub source: DecisionSource,
}

impl StrategyDecision {
    pub fn hold(entry_price: f64, rationale: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            signal: Signal::Hold,
            take_profit_pct: 0.0,
            stop_loss_pct: 0.0,
            entry_price,
            rationale_summary: rationale.into(),
            source,
        }
    }

    /// Build a decision; HOLD ignores the given TP/SL
    pub fn new(
        signal: Signal,
        take_profit_pct: f64,
        stop_loss_pct: f64,
        entry_price: f64,
        rationale: impl Into<String>,
        source: DecisionSource,
    ) -> Self {
        let mut decision = Self {
            signal,
            take_profit_pct: take_profit_pct.max(0.0),
            stop_loss_pct: stop_loss_pct.max(0.0),
            entry_price,
            rationale_summary: rationale.into(),
            source,
        };
        decision.normalize();
        decision
    }

    /// Change the signal; moving to HOLD zeroes TP/SL
    pub fn set_signal(&mut self, signal: Signal) {
        self.signal = signal;
        self.normalize();
    }

    /// Re-establish the HOLD => 0/0 invariant
    pub fn normalize(&mut self) {
        if self.signal.is_hold() {
            self.take_profit_pct = 0.0;
            self.stop_loss_pct = 0.0;
        }
    }

    pub fn holds_invariant(&self) -> bool {
        !self.signal.is_hold() || (self.take_profit_pct == 0.0 && self.stop_loss_pct == 0.0)
    }

    /// Degrade to HOLD, keeping the reason in the rationale
    pub fn degrade(&mut self, reason: impl fmt::Display) {
        self.set_signal(Signal::Hold);
        self.source = DecisionSource::Degraded;
        self.append_rationale(reason);
    }

    pub fn append_rationale(&mut self, clause: impl fmt::Display) {
        if self.rationale_summary.is_empty() {
            self.rationale_summary = clause.to_string();
        } else {
            self.rationale_summary = format!("{}, {}", self.rationale_summary, clause);
        }
    }
}

impl fmt::Display for StrategyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tp={:.2}% sl={:.2}% entry={:.2} [{}]",
            self.signal, self.take_profit_pct, self.stop_loss_pct, self.entry_price, self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_construction_zeroes_levels() {
        let d = StrategyDecision::new(Signal::Hold, 1.2, 0.6, 100.0, "", DecisionSource::Primary);
        assert_eq!(d.take_profit_pct, 0.0);
        assert_eq!(d.stop_loss_pct, 0.0);
        assert!(d.holds_invariant());
    }

    #[test]
    fn test_set_signal_to_hold_zeroes_levels() {
        let mut d = StrategyDecision::new(Signal::Long, 1.2, 0.6, 100.0, "x", DecisionSource::Primary);
        d.set_signal(Signal::Hold);
        assert_eq!((d.take_profit_pct, d.stop_loss_pct), (0.0, 0.0));
    }

    #[test]
    fn test_degrade_appends_reason() {
        let mut d = StrategyDecision::new(Signal::Short, 1.2, 0.6, 100.0, "RSI neutral", DecisionSource::Primary);
        d.degrade("model stage failed: boom");
        assert_eq!(d.signal, Signal::Hold);
        assert_eq!(d.source, DecisionSource::Degraded);
        assert_eq!(d.rationale_summary, "RSI neutral, model stage failed: boom");
    }

    #[test]
    fn test_negative_levels_are_floored() {
        let d = StrategyDecision::new(Signal::Long, -1.0, -2.0, 100.0, "", DecisionSource::Primary);
        assert_eq!((d.take_profit_pct, d.stop_loss_pct), (0.0, 0.0));
    }
}
