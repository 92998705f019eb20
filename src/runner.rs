//! Periodic per-symbol pipeline
//!
//! Each symbol runs in its own task with its own orchestrator, feature
//! window and paper ledger. A cycle is strictly sequential:
//! fetch -> decide -> route -> log -> notify.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::advisory::AdvisoryClient;
use crate::config::AppConfig;
use crate::execution::{ExecutionOutcome, ExecutionRouter, PaperLedger};
use crate::features::{IndicatorEngine, IndicatorSnapshot};
use crate::market_data::CandleSource;
use crate::notify::{format_decision, Notifier};
use crate::persistence::{TradeLog, TradeLogEntry};
use crate::sentiment::{SentimentAggregator, SentimentFeed};
use crate::strategy::{CycleInputs, HigherTimeframes, StrategyDecision, StrategyOrchestrator, TrendClassifier};
use crate::types::Timeframe;

/// Shared collaborators handed to every pipeline
#[derive(Clone)]
pub struct PipelineDeps {
    pub candles: Arc<dyn CandleSource>,
    pub news: Arc<dyn SentimentFeed>,
    pub community: Arc<dyn SentimentFeed>,
    pub advisory: Arc<dyn AdvisoryClient>,
    pub notifier: Arc<dyn Notifier>,
    pub trade_log: Arc<TradeLog>,
}

/// What one cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub decision: StrategyDecision,
    pub outcome: ExecutionOutcome,
}

pub struct SymbolPipeline {
    symbol: String,
    base_timeframe: Timeframe,
    candle_limit: usize,
    engine: IndicatorEngine,
    aggregator: SentimentAggregator,
    orchestrator: StrategyOrchestrator,
    router: ExecutionRouter,
    deps: PipelineDeps,
    last_summary_date: Option<NaiveDate>,
}

impl SymbolPipeline {
    pub fn new(symbol: impl Into<String>, config: &AppConfig, deps: PipelineDeps) -> Self {
        let orchestrator = StrategyOrchestrator::new(
            deps.advisory.clone(),
            config.strategy_params(),
            config.strategy.model_window,
            Box::new(TrendClassifier::new(config.strategy.model_min_accuracy)),
        );
        let router = ExecutionRouter::new(
            config.execution.mode,
            PaperLedger::new(config.execution.initial_balance, config.execution.position_size),
        );

        Self {
            symbol: symbol.into(),
            base_timeframe: config.base_timeframe(),
            candle_limit: config.market_data.candle_limit,
            engine: IndicatorEngine::new(config.indicator_config()),
            aggregator: SentimentAggregator::default(),
            orchestrator,
            router,
            deps,
            last_summary_date: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn router(&self) -> &ExecutionRouter {
        &self.router
    }

    async fn snapshot(&self, timeframe: Timeframe) -> Option<IndicatorSnapshot> {
        let candles = self
            .deps
            .candles
            .fetch_candles(&self.symbol, timeframe, self.candle_limit)
            .await;
        if candles.is_empty() {
            None
        } else {
            Some(self.engine.compute(&candles))
        }
    }

    /// Run one full cycle
    pub async fn run_once(&mut self) -> CycleReport {
        let (base, h1, h4) = tokio::join!(
            self.snapshot(self.base_timeframe),
            self.snapshot(Timeframe::Hour1),
            self.snapshot(Timeframe::Hour4),
        );
        let base = base.unwrap_or_else(|| {
            warn!(symbol = %self.symbol, "⚠️ No base candles, using empty snapshot");
            IndicatorSnapshot::insufficient(0.0, 0)
        });

        let headlines = self.deps.news.items().await;
        let posts = self.deps.community.items().await;
        let sentiment = self.aggregator.aggregate(&headlines);
        let community = self.aggregator.aggregate(&posts);

        let inputs = CycleInputs {
            symbol: self.symbol.clone(),
            base,
            higher: HigherTimeframes::new(h1, h4),
            sentiment,
            community,
            headlines,
        };

        let decision = self.orchestrator.run_cycle(&inputs).await;
        let outcome = self.router.route(&decision);

        let entry = TradeLogEntry::record(
            &self.symbol,
            self.base_timeframe,
            &decision,
            &inputs.base,
            sentiment,
            community,
            &outcome,
            self.router.ledger().balance(),
        );
        if let Err(e) = self.deps.trade_log.append(entry).await {
            warn!(symbol = %self.symbol, error = %e, "💾 Trade log append failed");
        }

        self.deps
            .notifier
            .notify(&format_decision(&self.symbol, &decision, &outcome))
            .await;

        self.maybe_send_daily_summary().await;

        CycleReport { decision, outcome }
    }

    /// Send yesterday's summary once the UTC date rolls over
    async fn maybe_send_daily_summary(&mut self) {
        let today = Utc::now().date_naive();
        match self.last_summary_date {
            Some(previous) if previous != today => {
                let summary = self.deps.trade_log.daily_summary(previous).await;
                info!(symbol = %self.symbol, %summary, "📊 Daily summary");
                self.deps
                    .notifier
                    .notify(&format!("{} ({})", summary, self.symbol))
                    .await;
            }
            _ => {}
        }
        self.last_summary_date = Some(today);
    }

    /// Loop until shutdown, or once when `run_once` is set
    pub async fn run(mut self, interval: Duration, run_once: bool, mut shutdown: watch::Receiver<bool>) {
        info!(symbol = %self.symbol, interval_secs = interval.as_secs(), "🚀 Pipeline started");

        loop {
            let report = self.run_once().await;
            info!(
                symbol = %self.symbol,
                decision = %report.decision,
                balance = %format!("{:.2}", self.router.ledger().balance()),
                "✅ Cycle complete"
            );

            if run_once || *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(symbol = %self.symbol, "🛑 Pipeline stopped");
    }
}
