//! Trade log persistence
//!
//! A JSON array of the most recent decisions, rewritten whole on every
//! append through a temp file and rename. A corrupt file is moved aside
//! and a fresh log started; a file that cannot be read fails the append
//! and is left untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::execution::ExecutionOutcome;
use crate::features::IndicatorSnapshot;
use crate::strategy::{DecisionSource, StrategyDecision};
use crate::types::{SentimentScore, Signal, Timeframe};

/// One persisted decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub signal: Signal,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub entry_price: f64,
    pub rationale_summary: String,
    pub source: DecisionSource,
    pub rsi: Option<f64>,
    pub macd: f64,
    pub sentiment: f64,
    pub community_sentiment: f64,
    /// Simulated profit, 0 when nothing was executed
    pub profit: f64,
    /// Ledger balance after this entry
    pub balance: f64,
}

impl TradeLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        symbol: &str,
        timeframe: Timeframe,
        decision: &StrategyDecision,
        snapshot: &IndicatorSnapshot,
        sentiment: SentimentScore,
        community: SentimentScore,
        outcome: &ExecutionOutcome,
        balance: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            signal: decision.signal,
            take_profit_pct: decision.take_profit_pct,
            stop_loss_pct: decision.stop_loss_pct,
            entry_price: decision.entry_price,
            rationale_summary: decision.rationale_summary.clone(),
            source: decision.source,
            rsi: snapshot.rsi,
            macd: snapshot.macd,
            sentiment: sentiment.value(),
            community_sentiment: community.value(),
            profit: outcome.profit(),
            balance,
        }
    }
}

/// Today's activity
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub entries: usize,
    /// Non-HOLD entries
    pub trades: usize,
    pub total_profit: f64,
    /// Share of trades with positive profit
    pub win_rate: f64,
}

impl fmt::Display for DailySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "📊 {} summary: {} decisions, {} trades, profit {:.2}, win rate {:.1}%",
            self.date,
            self.entries,
            self.trades,
            self.total_profit,
            self.win_rate * 100.0
        )
    }
}

pub struct TradeLog {
    path: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl TradeLog {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All retained entries, oldest first. Unreadable or corrupt files read as empty.
    pub async fn load(&self) -> Vec<TradeLogEntry> {
        let _guard = self.lock.lock().await;
        match self.read_entries().await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "💾 Trade log unreadable");
                Vec::new()
            }
        }
    }

    /// `Ok(None)` when the file holds something other than a JSON entry array
    async fn read_entries(&self) -> Result<Option<Vec<TradeLogEntry>>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Some(Vec::new())),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        match serde_json::from_str::<Vec<TradeLogEntry>>(&raw) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "💾 Trade log corrupt");
                Ok(None)
            }
        }
    }

    /// Move a corrupt file aside so a fresh log can take its place
    async fn quarantine(&self) -> Result<()> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", stamp));
        let target = PathBuf::from(name);

        tokio::fs::rename(&self.path, &target)
            .await
            .with_context(|| format!("Failed to move corrupt {} aside", self.path.display()))?;
        warn!(
            path = %self.path.display(),
            moved_to = %target.display(),
            "💾 Corrupt trade log moved aside, starting fresh"
        );
        Ok(())
    }

    /// Append one entry, evicting the oldest beyond `max_entries`.
    /// Read failures abort without touching the file.
    pub async fn append(&self, entry: TradeLogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut entries = match self.read_entries().await? {
            Some(entries) => entries,
            None => {
                self.quarantine().await?;
                Vec::new()
            }
        };
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize trade log")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(path = %self.path.display(), entries = entries.len(), "💾 Trade log saved");
        Ok(())
    }

    /// Entries, profit and win rate for one UTC day
    pub async fn daily_summary(&self, date: NaiveDate) -> DailySummary {
        let entries = self.load().await;
        summarize(&entries, date)
    }
}

pub fn summarize(entries: &[TradeLogEntry], date: NaiveDate) -> DailySummary {
    let today: Vec<&TradeLogEntry> = entries
        .iter()
        .filter(|e| e.timestamp.date_naive() == date)
        .collect();
    let trades: Vec<&&TradeLogEntry> = today.iter().filter(|e| e.signal.is_directional()).collect();
    let wins = trades.iter().filter(|e| e.profit > 0.0).count();

    DailySummary {
        date,
        entries: today.len(),
        trades: trades.len(),
        total_profit: today.iter().map(|e| e.profit).sum(),
        win_rate: if trades.is_empty() {
            0.0
        } else {
            wins as f64 / trades.len() as f64
        },
    }
}
