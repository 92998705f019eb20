//! Execution routing
//!
//! Hands the final decision to either the paper ledger or a record-only
//! path. Real order placement is not part of this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::strategy::{DecisionSource, StrategyDecision};
use crate::types::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fill against the paper ledger
    Simulated,
    /// Log and notify only
    SignalOnly,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Simulated => write!(f, "simulated"),
            ExecutionMode::SignalOnly => write!(f, "signal_only"),
        }
    }
}

/// Result of one simulated trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperFill {
    pub signal: Signal,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub balance: f64,
    pub win: bool,
}

/// Simulated account. Trades exit at the take-profit level.
#[derive(Debug, Clone)]
pub struct PaperLedger {
    initial_balance: f64,
    balance: f64,
    position_size: f64,
    trades: u64,
    wins: u64,
}

impl PaperLedger {
    pub fn new(initial_balance: f64, position_size: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            position_size,
            trades: 0,
            wins: 0,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn trades(&self) -> u64 {
        self.trades
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    /// Apply one trade; HOLD is not a trade
    pub fn apply_trade(&mut self, decision: &StrategyDecision) -> Option<PaperFill> {
        let entry = decision.entry_price;
        let tp = decision.take_profit_pct / 100.0;
        let size = self.position_size;

        let (exit_price, pnl) = match decision.signal {
            Signal::Long => {
                let exit = entry * (1.0 + tp);
                (exit, (exit - entry) * size)
            }
            Signal::Short => {
                let exit = entry * (1.0 - tp);
                (exit, (entry - exit) * size)
            }
            Signal::Hold => return None,
        };

        self.balance += pnl;
        self.trades += 1;
        let win = pnl >= 0.0;
        if win {
            self.wins += 1;
        }

        info!(
            signal = %decision.signal,
            entry = %format!("{:.2}", entry),
            exit = %format!("{:.2}", exit_price),
            pnl = %format!("{:.2}", pnl),
            balance = %format!("{:.2}", self.balance),
            "📝 [PAPER] Trade applied"
        );

        Some(PaperFill {
            signal: decision.signal,
            entry_price: entry,
            exit_price,
            size,
            pnl,
            balance: self.balance,
            win,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Skipped,
    Simulated(PaperFill),
    Recorded { source: DecisionSource },
}

impl ExecutionOutcome {
    pub fn profit(&self) -> f64 {
        match self {
            ExecutionOutcome::Simulated(fill) => fill.pnl,
            _ => 0.0,
        }
    }
}

pub struct ExecutionRouter {
    mode: ExecutionMode,
    ledger: PaperLedger,
}

impl ExecutionRouter {
    pub fn new(mode: ExecutionMode, ledger: PaperLedger) -> Self {
        Self { mode, ledger }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn ledger(&self) -> &PaperLedger {
        &self.ledger
    }

    pub fn route(&mut self, decision: &StrategyDecision) -> ExecutionOutcome {
        if decision.signal.is_hold() {
            return ExecutionOutcome::Skipped;
        }

        match self.mode {
            ExecutionMode::Simulated => match self.ledger.apply_trade(decision) {
                Some(fill) => ExecutionOutcome::Simulated(fill),
                None => ExecutionOutcome::Skipped,
            },
            ExecutionMode::SignalOnly => ExecutionOutcome::Recorded {
                source: decision.source,
            },
        }
    }
}
