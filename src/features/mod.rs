//! Feature Engine - Indicator snapshots from candle windows
//!
//! Computes the indicators the decision pipeline reads:
//! - RSI (Wilder's smoothing)
//! - EMA / TEMA
//! - MACD line (fast EMA - slow EMA)
//! - Bollinger Band position of the latest close
//! - RSI divergence over rolling extrema
//!
//! Every function here is pure. Short inputs produce insufficient-data
//! markers instead of errors, and no NaN ever leaves this module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Candle;

/// Indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub divergence_window: usize,
    pub divergence_min_samples: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            bb_period: 20,
            bb_std: 2.0,
            divergence_window: 14,
            divergence_min_samples: 30,
        }
    }
}

/// Where the latest close sits against the Bollinger bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BollingerPosition {
    Upper,
    Lower,
    Mid,
    InsufficientData,
}

impl fmt::Display for BollingerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BollingerPosition::Upper => write!(f, "upper"),
            BollingerPosition::Lower => write!(f, "lower"),
            BollingerPosition::Mid => write!(f, "mid"),
            BollingerPosition::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Price/RSI divergence classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    Bullish,
    Bearish,
    None,
    InsufficientData,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::Bullish => write!(f, "bullish"),
            Divergence::Bearish => write!(f, "bearish"),
            Divergence::None => write!(f, "none"),
            Divergence::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Indicator values for one (symbol, timeframe) at one point in time.
///
/// All fields come from the same candle window. `rsi == None` marks
/// insufficient data; `macd` is 0.0 until the slow EMA has enough samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub ema: f64,
    pub tema: f64,
    pub macd: f64,
    pub bollinger: BollingerPosition,
    pub divergence: Divergence,
    pub close: f64,
    /// Number of candles the snapshot was computed from
    pub sample_count: usize,
}

impl IndicatorSnapshot {
    /// Snapshot for an empty or unusable window
    pub fn insufficient(close: f64, sample_count: usize) -> Self {
        Self {
            rsi: None,
            ema: close,
            tema: close,
            macd: 0.0,
            bollinger: BollingerPosition::InsufficientData,
            divergence: Divergence::InsufficientData,
            close,
            sample_count,
        }
    }

    pub fn has_rsi(&self) -> bool {
        self.rsi.is_some()
    }

    /// True when the window was too short for any momentum reading
    pub fn is_insufficient(&self) -> bool {
        self.rsi.is_none()
    }
}

/// Snapshot provider bound to one indicator configuration
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Compute a snapshot from candles in chronological order
    pub fn compute(&self, candles: &[Candle]) -> IndicatorSnapshot {
        let snapshot = compute_snapshot(candles, &self.config);

        tracing::debug!(
            candle_count = candles.len(),
            rsi = ?snapshot.rsi,
            macd = snapshot.macd,
            bollinger = %snapshot.bollinger,
            divergence = %snapshot.divergence,
            "IndicatorEngine::compute completed"
        );

        snapshot
    }
}

/// Compute the full indicator snapshot for a candle window
pub fn compute_snapshot(candles: &[Candle], config: &IndicatorConfig) -> IndicatorSnapshot {
    let closes: Vec<f64> = candles
        .iter()
        .map(|c| c.close)
        .filter(|c| c.is_finite())
        .collect();

    let Some(&close) = closes.last() else {
        return IndicatorSnapshot::insufficient(0.0, 0);
    };

    let rsi_values = rsi_series(&closes, config.rsi_period);
    let rsi = rsi_values.last().copied().flatten();

    let ema = ema_series(&closes, config.ema_period)
        .last()
        .copied()
        .unwrap_or(close);
    let tema = tema_series(&closes, config.ema_period)
        .last()
        .copied()
        .unwrap_or(close);
    let macd = macd(&closes, config.macd_fast, config.macd_slow).unwrap_or(0.0);

    let bollinger = match bollinger_bands(&closes, config.bb_period, config.bb_std) {
        Some((upper, _, lower)) => classify_bollinger(close, upper, lower),
        None => BollingerPosition::InsufficientData,
    };

    let divergence = detect_divergence(
        &closes,
        &rsi_values,
        config.divergence_window,
        config.divergence_min_samples,
    );

    IndicatorSnapshot {
        rsi,
        ema: finite_or(ema, close),
        tema: finite_or(tema, close),
        macd: finite_or(macd, 0.0),
        bollinger,
        divergence,
        close,
        sample_count: closes.len(),
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// EMA over the whole series, seeded with the first value
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);

    for v in values.iter().skip(1) {
        ema = (v - ema) * multiplier + ema;
        out.push(ema);
    }

    out
}

/// TEMA = 3*EMA1 - 3*EMA2 + EMA3, all with the same period
pub fn tema_series(values: &[f64], period: usize) -> Vec<f64> {
    let ema1 = ema_series(values, period);
    let ema2 = ema_series(&ema1, period);
    let ema3 = ema_series(&ema2, period);

    ema1.iter()
        .zip(ema2.iter())
        .zip(ema3.iter())
        .map(|((e1, e2), e3)| 3.0 * e1 - 3.0 * e2 + e3)
        .collect()
}

/// MACD line of the latest close; None until `slow` closes exist
pub fn macd(closes: &[f64], fast: usize, slow: usize) -> Option<f64> {
    if closes.len() < slow || fast == 0 || slow == 0 {
        return None;
    }

    let ema_fast = *ema_series(closes, fast).last()?;
    let ema_slow = *ema_series(closes, slow).last()?;
    Some(ema_fast - ema_slow)
}

/// RSI using Wilder's smoothing, one entry per close.
///
/// Entries before index `period` are None. The first value seeds the averages
/// with a simple mean of the first `period` changes.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    let p = period as f64;
    let mut avg_gain = gains / p;
    let mut avg_loss = losses / p;
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };

        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    const EPS: f64 = 1e-12;

    if avg_loss < EPS && avg_gain < EPS {
        return 50.0; // No movement = neutral
    }
    if avg_loss < EPS {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - (100.0 / (1.0 + rs))).clamp(0.0, 100.0)
}

/// Bollinger Bands of the latest `period` closes (upper, middle, lower)
pub fn bollinger_bands(closes: &[f64], period: usize, multiplier: f64) -> Option<(f64, f64, f64)> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let recent = &closes[closes.len() - period..];
    let sma = recent.iter().sum::<f64>() / period as f64;
    let variance = recent.iter().map(|p| (p - sma).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    Some((sma + multiplier * std, sma, sma - multiplier * std))
}

fn classify_bollinger(close: f64, upper: f64, lower: f64) -> BollingerPosition {
    if close >= upper {
        BollingerPosition::Upper
    } else if close <= lower {
        BollingerPosition::Lower
    } else {
        BollingerPosition::Mid
    }
}

/// Compare the last two rolling extrema of close and RSI.
///
/// Bullish: price prints a lower low while RSI prints a higher low.
/// Bearish: price prints a higher high while RSI prints a lower high.
pub fn detect_divergence(
    closes: &[f64],
    rsi: &[Option<f64>],
    window: usize,
    min_samples: usize,
) -> Divergence {
    let n = closes.len();
    if n < min_samples.max(window + 1) || rsi.len() != n || window == 0 {
        return Divergence::InsufficientData;
    }

    // Two overlapping windows ending at the last and the previous bar
    let recent = n - window..n;
    let previous = n - window - 1..n - 1;

    let rsi_span: Option<Vec<f64>> = rsi[n - window - 1..].iter().copied().collect();
    if rsi_span.is_none() {
        return Divergence::InsufficientData;
    }

    fn min_of(xs: &[f64]) -> f64 {
        xs.iter().copied().fold(f64::INFINITY, f64::min)
    }
    fn max_of(xs: &[f64]) -> f64 {
        xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
    let rsi_vals = |r: std::ops::Range<usize>| -> Vec<f64> { rsi[r].iter().flatten().copied().collect() };

    let recent_close_low = min_of(&closes[recent.clone()]);
    let prev_close_low = min_of(&closes[previous.clone()]);
    let recent_rsi_low = min_of(&rsi_vals(recent.clone()));
    let prev_rsi_low = min_of(&rsi_vals(previous.clone()));

    if recent_close_low < prev_close_low && recent_rsi_low > prev_rsi_low {
        return Divergence::Bullish;
    }

    let recent_close_high = max_of(&closes[recent.clone()]);
    let prev_close_high = max_of(&closes[previous.clone()]);
    let recent_rsi_high = max_of(&rsi_vals(recent));
    let prev_rsi_high = max_of(&rsi_vals(previous));

    if recent_close_high > prev_close_high && recent_rsi_high < prev_rsi_high {
        return Divergence::Bearish;
    }

    Divergence::None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_candle(i: usize, close: f64) -> Candle {
        let ts = 1_700_000_000_000i64 + i as i64 * 900_000;
        Candle {
            open_time: ts,
            close_time: ts + 899_999,
            open: close,
            high: close + 5.0,
            low: close - 5.0,
            close,
            volume: 1000.0,
        }
    }

    pub(crate) fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_candle(i, c))
            .collect()
    }

    /// 15 rising bars, a crash, a slow grind up, then a marginal new low
    pub(crate) fn bullish_divergence_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        closes.push(90.0);
        let mut x = 90.0;
        for i in 16..29 {
            x += if i % 2 == 0 { 0.5 } else { -0.2 };
            closes.push(x);
        }
        closes.push(89.5);
        closes
    }

    #[test]
    fn test_rsi_insufficient_below_period_plus_one() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());

        assert!(snapshot.rsi.is_none());
        assert!(snapshot.is_insufficient());
        assert_eq!(snapshot.divergence, Divergence::InsufficientData);
        assert_eq!(snapshot.bollinger, BollingerPosition::InsufficientData);
        assert!(snapshot.ema.is_finite());
        assert!(snapshot.tema.is_finite());
        assert_eq!(snapshot.macd, 0.0);
    }

    #[test]
    fn test_rsi_available_at_period_plus_one() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + (i % 3) as f64).collect();
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());
        let rsi = snapshot.rsi.unwrap();
        assert!((0.0..=100.0).contains(&rsi));
    }

    #[test]
    fn test_empty_window_is_neutral() {
        let snapshot = compute_snapshot(&[], &IndicatorConfig::default());
        assert_eq!(snapshot, IndicatorSnapshot::insufficient(0.0, 0));
    }

    #[test]
    fn test_rsi_saturates_when_no_losses() {
        let closes: Vec<f64> = (0..40).map(|i| 50_000.0 + i as f64 * 10.0).collect();
        let rsi = rsi_series(&closes, 14);
        assert_eq!(rsi.last().copied().flatten(), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_series_is_neutral() {
        let closes = vec![100.0; 20];
        let rsi = rsi_series(&closes, 14);
        assert_eq!(rsi[19], Some(50.0));
        assert!(rsi[13].is_none());
    }

    #[test]
    fn test_rsi_downtrend_is_low() {
        let closes: Vec<f64> = (0..30)
            .map(|i| 100.0 - i as f64 + if i % 4 == 0 { 0.5 } else { 0.0 })
            .collect();
        let rsi = rsi_series(&closes, 14).last().copied().flatten().unwrap();
        assert!(rsi < 30.0, "rsi was {}", rsi);
    }

    #[test]
    fn test_ema_and_tema_of_constant_series() {
        let closes = vec![42.0; 30];
        assert!((ema_series(&closes, 14).last().unwrap() - 42.0).abs() < 1e-9);
        assert!((tema_series(&closes, 14).last().unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_smoothing_factor() {
        let ema = ema_series(&[10.0, 20.0], 3);
        // alpha = 2 / (3 + 1) = 0.5
        assert!((ema[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_macd_sign_follows_trend() {
        let up: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        assert!(macd(&up, 12, 26).unwrap() > 0.0);
        assert!(macd(&down, 12, 26).unwrap() < 0.0);
        assert!(macd(&up[..25], 12, 26).is_none());
    }

    #[test]
    fn test_bollinger_position() {
        let mut closes = vec![100.0; 19];
        closes.push(110.0);
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());
        assert_eq!(snapshot.bollinger, BollingerPosition::Upper);

        let mut closes = vec![100.0; 19];
        closes.push(90.0);
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());
        assert_eq!(snapshot.bollinger, BollingerPosition::Lower);

        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 2) as f64).collect();
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());
        assert_eq!(snapshot.bollinger, BollingerPosition::Mid);
    }

    #[test]
    fn test_bullish_divergence() {
        let closes = bullish_divergence_closes();
        assert_eq!(closes.len(), 30);
        let rsi = rsi_series(&closes, 14);
        assert_eq!(detect_divergence(&closes, &rsi, 14, 30), Divergence::Bullish);
    }

    #[test]
    fn test_bearish_divergence() {
        let closes: Vec<f64> = bullish_divergence_closes().iter().map(|c| 200.0 - c).collect();
        let rsi = rsi_series(&closes, 14);
        assert_eq!(detect_divergence(&closes, &rsi, 14, 30), Divergence::Bearish);
    }

    #[test]
    fn test_divergence_requires_thirty_samples() {
        let closes = bullish_divergence_closes();
        let short = &closes[1..];
        let rsi = rsi_series(short, 14);
        assert_eq!(
            detect_divergence(short, &rsi, 14, 30),
            Divergence::InsufficientData
        );
    }

    #[test]
    fn test_no_divergence_in_steady_trend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let rsi = rsi_series(&closes, 14);
        let d = detect_divergence(&closes, &rsi, 14, 30);
        assert_ne!(d, Divergence::InsufficientData);
    }

    #[test]
    fn test_non_finite_closes_are_ignored() {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        closes.push(f64::NAN);
        let snapshot = compute_snapshot(&candles_from(&closes), &IndicatorConfig::default());
        assert_eq!(snapshot.close, 119.0);
        assert!(snapshot.rsi.unwrap().is_finite());
    }
}
