//! Core types used throughout FusionBot
//!
//! Defines candles, timeframes, signals and the sentiment score newtype.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle timeframes the pipeline consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Min15,
    Hour1,
    Hour4,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Min15
    }
}

impl Timeframe {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Timeframe::Min15 => 15 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
        }
    }

    /// Interval string understood by Binance kline endpoints
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "15m" | "15min" => Some(Timeframe::Min15),
            "1h" | "1hour" => Some(Timeframe::Hour1),
            "4h" | "4hour" => Some(Timeframe::Hour4),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interval())
    }
}

/// Candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in milliseconds
    pub open_time: i64,
    /// Close time in milliseconds
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume in base currency
    pub volume: f64,
}

/// Directional trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Long,
    Short,
    Hold,
}

impl Default for Signal {
    fn default() -> Self {
        Signal::Hold
    }
}

impl Signal {
    pub fn is_hold(&self) -> bool {
        matches!(self, Signal::Hold)
    }

    pub fn is_directional(&self) -> bool {
        !self.is_hold()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Sentiment scalar, always within [-1.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentScore(f64);

impl SentimentScore {
    pub const NEUTRAL: SentimentScore = SentimentScore(0.0);

    /// Build a score, clamping into range. NaN collapses to neutral.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::NEUTRAL;
        }
        SentimentScore(value.clamp(-1.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Polarity bucket used in rationale text
    pub fn bucket(&self, threshold: f64) -> SentimentBucket {
        if self.0 > threshold {
            SentimentBucket::Positive
        } else if self.0 < -threshold {
            SentimentBucket::Negative
        } else {
            SentimentBucket::Mixed
        }
    }
}

impl fmt::Display for SentimentScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentBucket {
    Positive,
    Negative,
    Mixed,
}

impl fmt::Display for SentimentBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentBucket::Positive => write!(f, "positive"),
            SentimentBucket::Negative => write!(f, "negative"),
            SentimentBucket::Mixed => write!(f, "mixed"),
        }
    }
}
