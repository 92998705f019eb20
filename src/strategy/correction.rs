//! Model Correction Stage
//!
//! Keeps a bounded window of recent feature vectors per pipeline and lets an
//! independent model turn a HOLD into LONG/SHORT. Directional signals pass
//! through untouched; a window that is not yet full always yields HOLD.

use ndarray::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};
use std::collections::VecDeque;

use crate::errors::{BotError, BotResult};
use crate::features::IndicatorSnapshot;
use crate::types::{SentimentScore, Signal};

/// One observation of the model inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub rsi: f64,
    pub macd: f64,
    pub ema: f64,
    pub tema: f64,
    pub sentiment: f64,
    pub close: f64,
}

impl FeatureVector {
    /// None when RSI is not available yet
    pub fn from_snapshot(snapshot: &IndicatorSnapshot, sentiment: SentimentScore) -> Option<Self> {
        Some(Self {
            rsi: snapshot.rsi?,
            macd: snapshot.macd,
            ema: snapshot.ema,
            tema: snapshot.tema,
            sentiment: sentiment.value(),
            close: snapshot.close,
        })
    }

    /// Model inputs (close is only used for labelling)
    pub fn inputs(&self) -> [f64; 5] {
        [self.rsi, self.macd, self.ema, self.tema, self.sentiment]
    }
}

/// Fixed-capacity ring buffer, oldest evicted first
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    capacity: usize,
    buf: VecDeque<FeatureVector>,
}

impl FeatureWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, v: FeatureVector) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(v);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureVector> {
        self.buf.iter()
    }

    pub fn latest(&self) -> Option<&FeatureVector> {
        self.buf.back()
    }
}

/// Independent predictor over a full feature window
#[cfg_attr(test, mockall::automock)]
pub trait SignalModel: Send + Sync {
    fn predict(&self, window: &FeatureWindow) -> BotResult<Signal>;
}

/// Logistic regression refit on every call.
///
/// Each row is labelled by whether the following close rose; the model
/// then classifies the latest row. Stays at HOLD unless it can fit the
/// window with at least `min_accuracy`.
#[derive(Debug, Clone)]
pub struct TrendClassifier {
    min_accuracy: f64,
}

impl Default for TrendClassifier {
    fn default() -> Self {
        Self { min_accuracy: 0.6 }
    }
}

impl TrendClassifier {
    pub fn new(min_accuracy: f64) -> Self {
        Self { min_accuracy }
    }

    /// Min-max scale each column into [0, 1]; flat columns become 0
    fn scale(rows: &[[f64; 5]]) -> Array2<f64> {
        let mut x = Array2::zeros((rows.len(), 5));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                x[[i, j]] = *v;
            }
        }

        for mut col in x.columns_mut() {
            let min = col.iter().copied().fold(f64::INFINITY, f64::min);
            let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            col.mapv_inplace(|v| if range > 1e-12 { (v - min) / range } else { 0.0 });
        }
        x
    }

    fn to_matrix(rows: &[Vec<f64>]) -> BotResult<DenseMatrix<f64>> {
        DenseMatrix::from_2d_array(&rows.iter().map(|r| r.as_slice()).collect::<Vec<_>>())
            .map_err(|e| BotError::Model {
                reason: format!("matrix construction failed: {:?}", e),
            })
    }
}

impl SignalModel for TrendClassifier {
    fn predict(&self, window: &FeatureWindow) -> BotResult<Signal> {
        let vectors: Vec<&FeatureVector> = window.iter().collect();
        if vectors.len() < 3 {
            return Ok(Signal::Hold);
        }

        let inputs: Vec<[f64; 5]> = vectors.iter().map(|v| v.inputs()).collect();
        if inputs.iter().flatten().any(|v| !v.is_finite()) {
            return Err(BotError::Model {
                reason: "non-finite feature in window".to_string(),
            });
        }

        let scaled = Self::scale(&inputs);
        let rows: Vec<Vec<f64>> = scaled.rows().into_iter().map(|r| r.to_vec()).collect();

        let labels: Vec<i64> = vectors
            .windows(2)
            .map(|w| if w[1].close > w[0].close { 1 } else { 0 })
            .collect();
        let train_rows = &rows[..labels.len()];

        if labels.iter().all(|&l| l == labels[0]) {
            tracing::debug!(label = labels[0], "Single-class window, model abstains");
            return Ok(Signal::Hold);
        }

        let x = Self::to_matrix(train_rows)?;
        let model = match LogisticRegression::fit(&x, &labels, LogisticRegressionParameters::default()) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = ?e, "Logistic regression fit failed, model abstains");
                return Ok(Signal::Hold);
            }
        };

        let predictions: Vec<i64> = model.predict(&x).unwrap_or_default();
        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(p, a)| **p == **a)
            .count();
        let accuracy = correct as f64 / labels.len() as f64;

        if accuracy < self.min_accuracy {
            tracing::debug!(accuracy, min = self.min_accuracy, "Model accuracy too low, abstaining");
            return Ok(Signal::Hold);
        }

        let latest = Self::to_matrix(&rows[rows.len() - 1..])?;
        let predicted = model
            .predict(&latest)
            .map_err(|e| BotError::Model {
                reason: format!("prediction failed: {:?}", e),
            })?
            .first()
            .copied();

        Ok(match predicted {
            Some(1) => Signal::Long,
            Some(_) => Signal::Short,
            None => Signal::Hold,
        })
    }
}

/// Window owner plus model, one per pipeline instance
pub struct ModelCorrection {
    window: FeatureWindow,
    model: Box<dyn SignalModel>,
}

impl ModelCorrection {
    pub fn new(capacity: usize, model: Box<dyn SignalModel>) -> Self {
        Self {
            window: FeatureWindow::new(capacity),
            model,
        }
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    /// Record this cycle's features; skipped while RSI is unavailable
    pub fn observe(&mut self, snapshot: &IndicatorSnapshot, sentiment: SentimentScore) {
        if let Some(v) = FeatureVector::from_snapshot(snapshot, sentiment) {
            self.window.push(v);
        }
    }

    /// Observe, then possibly replace a HOLD with the model's call
    pub fn correct(
        &mut self,
        signal: Signal,
        snapshot: &IndicatorSnapshot,
        sentiment: SentimentScore,
    ) -> BotResult<Signal> {
        self.observe(snapshot, sentiment);

        if signal.is_directional() {
            return Ok(signal);
        }
        if !self.window.is_full() {
            return Ok(Signal::Hold);
        }

        self.model.predict(&self.window)
    }
}
