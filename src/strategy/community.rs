//! Community Adjustment Stage - pure veto toward HOLD

use crate::types::{SentimentScore, Signal};

/// Drop LONG on strongly negative community mood and SHORT on strongly
/// positive mood. HOLD is returned as is.
pub fn adjust(signal: Signal, community: SentimentScore, threshold: f64) -> Signal {
    match signal {
        Signal::Long if community.value() < -threshold => Signal::Hold,
        Signal::Short if community.value() > threshold => Signal::Hold,
        other => other,
    }
}
