//! Strategy Orchestrator
//!
//! One call per cycle: advisory -> interpret -> fallback (only acts on HOLD)
//! -> model correction -> community veto. A failing stage degrades the
//! decision to HOLD and the remaining stages still run.

use std::sync::Arc;
use tracing::{info, warn};

use crate::advisory::{primary_prompt, AdvisoryClient};
use crate::errors::BotError;
use crate::features::IndicatorSnapshot;
use crate::sentiment::NewsItem;
use crate::types::SentimentScore;

use super::community::adjust;
use super::correction::{ModelCorrection, SignalModel};
use super::fallback::{FallbackEvaluator, HigherTimeframes};
use super::interpreter::interpret;
use super::{DecisionSource, StrategyDecision, StrategyParams};

/// Everything one cycle needs
#[derive(Debug, Clone)]
pub struct CycleInputs {
    pub symbol: String,
    pub base: IndicatorSnapshot,
    pub higher: HigherTimeframes,
    pub sentiment: SentimentScore,
    pub community: SentimentScore,
    pub headlines: Vec<NewsItem>,
}

pub struct StrategyOrchestrator {
    advisory: Arc<dyn AdvisoryClient>,
    params: StrategyParams,
    fallback: FallbackEvaluator,
    correction: ModelCorrection,
}

impl StrategyOrchestrator {
    pub fn new(
        advisory: Arc<dyn AdvisoryClient>,
        params: StrategyParams,
        model_window: usize,
        model: Box<dyn SignalModel>,
    ) -> Self {
        Self {
            advisory,
            fallback: FallbackEvaluator::new(params.clone()),
            params,
            correction: ModelCorrection::new(model_window, model),
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn correction(&self) -> &ModelCorrection {
        &self.correction
    }

    /// Run every stage once and return the final decision
    pub async fn run_cycle(&mut self, inputs: &CycleInputs) -> StrategyDecision {
        // Stage 1: primary advisory
        let prompt = primary_prompt(&inputs.symbol, &inputs.base, inputs.sentiment, &inputs.headlines);
        let advisory = self.advisory.request(&prompt).await;
        let mut decision = interpret(&advisory, &inputs.base, inputs.sentiment, &self.params);
        enforce(&mut decision);

        // Stage 2: fallback, pass-through unless HOLD
        if decision.signal.is_hold() {
            match self
                .fallback
                .evaluate(self.advisory.as_ref(), inputs.sentiment, &inputs.base, &inputs.higher)
                .await
            {
                Ok(fallback) if fallback.signal.is_directional() => decision = fallback,
                Ok(_) => decision.append_rationale("fallback: held"),
                Err(e) => stage_failed(&mut decision, "fallback", e),
            }
        }
        enforce(&mut decision);

        // Stage 3: model correction (always observes)
        let before = decision.signal;
        match self.correction.correct(before, &inputs.base, inputs.sentiment) {
            Ok(signal) if before.is_hold() && signal.is_directional() => {
                decision.set_signal(signal);
                decision.take_profit_pct = self.params.fallback_tp_pct;
                decision.stop_loss_pct = self.params.fallback_sl_pct;
                decision.source = DecisionSource::Model;
                decision.append_rationale(format!("model: {}", signal));
            }
            Ok(_) => {}
            Err(e) => stage_failed(&mut decision, "model", e),
        }
        enforce(&mut decision);

        // Stage 4: community veto
        let vetoed = adjust(decision.signal, inputs.community, self.params.community_threshold);
        if vetoed != decision.signal {
            decision.set_signal(vetoed);
            decision.append_rationale(format!("community veto ({})", inputs.community));
        }
        enforce(&mut decision);

        info!(
            symbol = %inputs.symbol,
            signal = %decision.signal,
            tp = decision.take_profit_pct,
            sl = decision.stop_loss_pct,
            source = %decision.source,
            "🧭 Decision ready"
        );

        decision
    }
}

fn stage_failed(decision: &mut StrategyDecision, stage: &'static str, err: BotError) {
    warn!(stage, error = %err, "⚠️ Stage failed, degrading to HOLD");
    decision.degrade(BotError::stage(stage, err.to_string()));
}

fn enforce(decision: &mut StrategyDecision) {
    debug_assert!(decision.holds_invariant(), "HOLD must carry zero TP/SL");
    decision.normalize();
}
