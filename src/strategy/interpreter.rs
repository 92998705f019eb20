//! Response Interpreter
//!
//! The only place that reads raw advisory text. Everything downstream sees
//! a `StrategyDecision`.
//!
//! Direction resolution ladder:
//! 1. an explicit marker (`direction:`, `recommendation:`, `전략:` ...) naming a direction
//! 2. only one direction mentioned at all
//! 3. a phrase like "go long" / "short seems more aligned" (conflicting phrases => HOLD)
//! 4. HOLD

use crate::advisory::Advisory;
use crate::features::IndicatorSnapshot;
use crate::types::{SentimentScore, Signal};

use super::{DecisionSource, StrategyDecision, StrategyParams};

const LONG_TOKENS: &[&str] = &["long", "롱", "매수"];
const SHORT_TOKENS: &[&str] = &["short", "숏", "매도"];
const HOLD_TOKENS: &[&str] = &["hold", "관망"];

const MARKERS: &[&str] = &[
    "recommendation:",
    "recommend:",
    "전략:",
    "매매 방향:",
    "direction:",
];

/// `{}` is replaced by the direction word
const PHRASES: &[&str] = &[
    "go {}",
    "consider a {}",
    "consider {}",
    "{} seems more aligned",
    "{} position is favored",
];

pub const TAKE_PROFIT_KEYWORDS: &[&str] = &["take profit", "take-profit", "tp", "익절"];
pub const STOP_LOSS_KEYWORDS: &[&str] = &["stop loss", "stop-loss", "sl", "손절"];

/// Shapes of failure sentinels, matched at the start of the reply only
const ERROR_PREFIXES: &[&str] = &[
    "⚠",
    "error:",
    "[error]",
    "request failed",
    "request timed out",
    "응답 실패",
];

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte offsets of `token` in `haystack`. ASCII tokens must sit on word
/// boundaries; non-ASCII tokens match as plain substrings.
fn token_positions(haystack: &str, token: &str) -> Vec<usize> {
    let bounded = token.is_ascii();
    haystack
        .match_indices(token)
        .filter(|(start, _)| {
            if !bounded {
                return true;
            }
            let end = start + token.len();
            let before_ok = haystack[..*start]
                .chars()
                .next_back()
                .map_or(true, |c| !is_word_char(c));
            let after_ok = haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !is_word_char(c));
            before_ok && after_ok
        })
        .map(|(start, _)| start)
        .collect()
}

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| !token_positions(haystack, t).is_empty())
}

fn first_position(haystack: &str, tokens: &[&str]) -> Option<usize> {
    tokens
        .iter()
        .flat_map(|t| token_positions(haystack, t))
        .min()
}

/// Direction word at the start of `text`, past spaces and markdown on the same line
fn leading_signal(text: &str) -> Option<Signal> {
    let rest = text.trim_start_matches(|c: char| {
        (c.is_whitespace() && c != '\n') || matches!(c, '*' | '-' | ':' | '"' | '\'')
    });

    [
        (Signal::Long, LONG_TOKENS),
        (Signal::Short, SHORT_TOKENS),
        (Signal::Hold, HOLD_TOKENS),
    ]
    .into_iter()
    .find(|(_, tokens)| tokens.iter().any(|t| token_positions(rest, t).first() == Some(&0)))
    .map(|(signal, _)| signal)
}

/// Direction named by the first marker that is immediately followed by one.
/// "recommendation: avoid long" names nothing.
fn marker_signal(lower: &str) -> Option<Signal> {
    let mut hits: Vec<(usize, &str)> = MARKERS
        .iter()
        .flat_map(|m| lower.match_indices(m).map(|(p, _)| (p, *m)))
        .collect();
    hits.sort_by_key(|(p, _)| *p);

    hits.into_iter()
        .find_map(|(pos, marker)| leading_signal(&lower[pos + marker.len()..]))
}

fn phrase_signal(lower: &str) -> Signal {
    let hit = |dir: &str| {
        PHRASES
            .iter()
            .any(|p| !token_positions(lower, &p.replace("{}", dir)).is_empty())
    };

    match (hit("long"), hit("short")) {
        (true, false) => Signal::Long,
        (false, true) => Signal::Short,
        _ => Signal::Hold,
    }
}

/// Resolve the direction of free-form advisory text
pub fn resolve_signal(text: &str) -> Signal {
    let lower = text.to_lowercase();

    if let Some(signal) = marker_signal(&lower) {
        return signal;
    }

    let has_long = contains_any(&lower, LONG_TOKENS);
    let has_short = contains_any(&lower, SHORT_TOKENS);

    match (has_long, has_short) {
        (true, false) => Signal::Long,
        (false, true) => Signal::Short,
        (false, false) => Signal::Hold,
        (true, true) => phrase_signal(&lower),
    }
}

/// First number after a keyword on the first line that mentions one
pub fn extract_level(text: &str, keywords: &[&str]) -> Option<f64> {
    let lower = text.to_lowercase();

    for line in lower.lines() {
        let Some(keyword_end) = keywords
            .iter()
            .flat_map(|k| token_positions(line, k).into_iter().map(move |p| p + k.len()))
            .min()
        else {
            continue;
        };

        let after = &line[keyword_end..];
        let run: String = after
            .chars()
            .skip_while(|c| !c.is_ascii_digit() && *c != '.')
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let run = run.trim_end_matches('.');
        if !run.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        return run
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 100.0));
    }

    None
}

/// Sentinel replies from failed advisory calls
pub fn is_error_reply(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    ERROR_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Human-readable summary of the inputs behind a decision
pub fn rationale(snapshot: &IndicatorSnapshot, sentiment: SentimentScore, params: &StrategyParams) -> String {
    let rsi_zone = match snapshot.rsi {
        None => "RSI insufficient data".to_string(),
        Some(r) if r < params.rsi_oversold => format!("RSI oversold (<{})", params.rsi_oversold),
        Some(r) if r > params.rsi_overbought => format!("RSI overbought (>{})", params.rsi_overbought),
        Some(_) => "RSI neutral".to_string(),
    };

    [
        rsi_zone,
        format!("BB position: {}", snapshot.bollinger),
        format!("sentiment {}", sentiment.bucket(params.sentiment_bucket)),
        format!("divergence: {}", snapshot.divergence),
    ]
    .join(", ")
}

fn unavailable(reason: &str, snapshot: &IndicatorSnapshot, sentiment: SentimentScore, params: &StrategyParams) -> StrategyDecision {
    tracing::warn!(reason = %reason, "🤖 Advisory unusable, holding");
    StrategyDecision::hold(
        snapshot.close,
        format!("advisory unavailable: {}, {}", reason, rationale(snapshot, sentiment, params)),
        DecisionSource::Degraded,
    )
}

/// Interpret an advisory reply into a decision
pub fn interpret(
    advisory: &Advisory,
    snapshot: &IndicatorSnapshot,
    sentiment: SentimentScore,
    params: &StrategyParams,
) -> StrategyDecision {
    let text = match advisory {
        Advisory::Unavailable { reason } => return unavailable(reason, snapshot, sentiment, params),
        Advisory::Text(t) if t.trim().is_empty() => {
            return unavailable("empty reply", snapshot, sentiment, params)
        }
        Advisory::Text(t) if is_error_reply(t) => {
            let first_line = t.trim().lines().next().unwrap_or("").chars().take(120).collect::<String>();
            return unavailable(&first_line, snapshot, sentiment, params);
        }
        Advisory::Text(t) => t.as_str(),
    };

    let signal = resolve_signal(text);
    let (tp, sl) = if signal.is_hold() {
        (0.0, 0.0)
    } else {
        (
            extract_level(text, TAKE_PROFIT_KEYWORDS).unwrap_or(params.primary_tp_pct),
            extract_level(text, STOP_LOSS_KEYWORDS).unwrap_or(params.primary_sl_pct),
        )
    };

    let decision = StrategyDecision::new(
        signal,
        tp,
        sl,
        snapshot.close,
        rationale(snapshot, sentiment, params),
        DecisionSource::Primary,
    );

    tracing::debug!(signal = %decision.signal, tp, sl, "Advisory interpreted");
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{BollingerPosition, Divergence};

    fn oversold_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: Some(28.0),
            ema: 27_600.0,
            tema: 27_580.0,
            macd: -24.2,
            bollinger: BollingerPosition::Lower,
            divergence: Divergence::None,
            close: 27_500.0,
            sample_count: 150,
        }
    }

    #[test]
    fn test_single_direction_mentions() {
        assert_eq!(resolve_signal("AI recommends LONG"), Signal::Long);
        assert_eq!(resolve_signal("Short it."), Signal::Short);
        assert_eq!(resolve_signal("롱 포지션이 유리하다고 봅니다"), Signal::Long);
        assert_eq!(resolve_signal("매도 우위"), Signal::Short);
        assert_eq!(resolve_signal("Nothing to see here"), Signal::Hold);
    }

    #[test]
    fn test_tokens_need_word_boundaries() {
        assert_eq!(resolve_signal("Longevity of the shortage"), Signal::Hold);
        assert_eq!(resolve_signal("how long"), Signal::Long);
    }

    #[test]
    fn test_conflict_without_marker_or_phrase_holds() {
        assert_eq!(
            resolve_signal("Both long and short setups are possible here."),
            Signal::Hold
        );
    }

    #[test]
    fn test_marker_wins_conflict() {
        let text = "Short-term pullback likely, but Recommendation: LONG on the dip.";
        assert_eq!(resolve_signal(text), Signal::Long);
        assert_eq!(resolve_signal("1. 매매 방향: short\n롱은 위험"), Signal::Short);
        assert_eq!(resolve_signal("전략: LONG\n익절: 1.5\n손절: 0.5 (short 시 반대)"), Signal::Long);
    }

    #[test]
    fn test_marker_naming_hold() {
        assert_eq!(resolve_signal("Direction: HOLD\nlong and short both risky"), Signal::Hold);
        assert_eq!(resolve_signal("Direction: hold, long bias later"), Signal::Hold);
    }

    #[test]
    fn test_marker_must_name_direction_first() {
        assert_eq!(resolve_signal("Recommendation: avoid long, go short"), Signal::Short);
        assert_eq!(
            resolve_signal("Recommendation: do not go long; consider a short."),
            Signal::Hold
        );
        assert_eq!(
            resolve_signal(
                "Recommendation: stay flat until the long squeeze ends, then short seems more aligned"
            ),
            Signal::Short
        );
        assert_eq!(resolve_signal("Direction: unclear, long or short"), Signal::Hold);
    }

    #[test]
    fn test_marker_tolerates_markdown() {
        assert_eq!(resolve_signal("**Direction:** SHORT\nlong later maybe"), Signal::Short);
        assert_eq!(resolve_signal("Direction: - LONG, not short"), Signal::Long);
    }

    #[test]
    fn test_later_marker_used_when_first_names_nothing() {
        let text = "Recommendation: see below\nlong vs short weighed\nDirection: SHORT";
        assert_eq!(resolve_signal(text), Signal::Short);
    }

    #[test]
    fn test_phrase_tie_break() {
        assert_eq!(
            resolve_signal("Short squeeze risk exists, but go long here."),
            Signal::Long
        );
        assert_eq!(
            resolve_signal("Long liquidations piled up; consider a short."),
            Signal::Short
        );
        assert_eq!(
            resolve_signal("After weighing long vs short, short seems more aligned with momentum."),
            Signal::Short
        );
        assert_eq!(
            resolve_signal("Long position is favored over short."),
            Signal::Long
        );
    }

    #[test]
    fn test_conflicting_phrases_hold() {
        assert_eq!(resolve_signal("go long now, or consider short later"), Signal::Hold);
    }

    #[test]
    fn test_extract_levels() {
        let text = "Direction: LONG\nTake profit: 2.5%\nStop loss: 0.8%";
        assert_eq!(extract_level(text, TAKE_PROFIT_KEYWORDS), Some(2.5));
        assert_eq!(extract_level(text, STOP_LOSS_KEYWORDS), Some(0.8));

        let ko = "전략: LONG\n익절: 1.5\n손절: 0.5";
        assert_eq!(extract_level(ko, TAKE_PROFIT_KEYWORDS), Some(1.5));
        assert_eq!(extract_level(ko, STOP_LOSS_KEYWORDS), Some(0.5));
    }

    #[test]
    fn test_extract_level_after_keyword_only() {
        // The 4 in "4h" comes before the keyword
        let text = "On the 4h chart, TP 3.2 looks fine.";
        assert_eq!(extract_level(text, TAKE_PROFIT_KEYWORDS), Some(3.2));
    }

    #[test]
    fn test_extract_level_missing_or_unparseable() {
        assert_eq!(extract_level("Take profit: soon", TAKE_PROFIT_KEYWORDS), None);
        assert_eq!(extract_level("no levels", STOP_LOSS_KEYWORDS), None);
        assert_eq!(extract_level("TP: 1.2.3", TAKE_PROFIT_KEYWORDS), None);
        assert_eq!(extract_level("TP: 1.5.", TAKE_PROFIT_KEYWORDS), Some(1.5));
    }

    #[test]
    fn test_extract_level_is_clamped() {
        assert_eq!(extract_level("take-profit 250", TAKE_PROFIT_KEYWORDS), Some(100.0));
    }

    #[test]
    fn test_oversold_long_scenario() {
        let d = interpret(
            &Advisory::Text("AI recommends LONG".to_string()),
            &oversold_snapshot(),
            SentimentScore::new(0.35),
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Long);
        assert_eq!(d.take_profit_pct, 1.2);
        assert_eq!(d.stop_loss_pct, 0.6);
        assert_eq!(d.entry_price, 27_500.0);
        assert_eq!(d.source, DecisionSource::Primary);
        assert!(d.rationale_summary.contains("oversold"));
        assert_eq!(
            d.rationale_summary,
            "RSI oversold (<30), BB position: lower, sentiment positive, divergence: none"
        );
    }

    #[test]
    fn test_empty_text_holds() {
        let d = interpret(
            &Advisory::Text(String::new()),
            &oversold_snapshot(),
            SentimentScore::NEUTRAL,
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Hold);
        assert_eq!((d.take_profit_pct, d.stop_loss_pct), (0.0, 0.0));
        assert_eq!(d.source, DecisionSource::Degraded);
        assert!(d.rationale_summary.starts_with("advisory unavailable"));
    }

    #[test]
    fn test_error_sentinels_hold() {
        for text in ["⚠️ Grok 응답 실패", "Error: upstream 502", "request failed: long timeout"] {
            let d = interpret(
                &Advisory::Text(text.to_string()),
                &oversold_snapshot(),
                SentimentScore::NEUTRAL,
                &StrategyParams::default(),
            );
            assert_eq!(d.signal, Signal::Hold, "{}", text);
            assert_eq!(d.source, DecisionSource::Degraded);
        }
    }

    #[test]
    fn test_error_words_inside_real_replies() {
        assert!(!is_error_reply("Error margin is thin; Direction: LONG"));
        assert!(!is_error_reply("The rally timed out near resistance. Direction: SHORT"));
        assert!(is_error_reply("[ERROR] upstream unavailable"));

        let d = interpret(
            &Advisory::Text("Error margin is thin; Direction: LONG".to_string()),
            &oversold_snapshot(),
            SentimentScore::NEUTRAL,
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Long);
        assert_eq!(d.source, DecisionSource::Primary);
    }

    #[test]
    fn test_unavailable_holds_with_reason() {
        let d = interpret(
            &Advisory::unavailable("request timed out"),
            &oversold_snapshot(),
            SentimentScore::NEUTRAL,
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Hold);
        assert!(d.rationale_summary.starts_with("advisory unavailable: request timed out"));
    }

    #[test]
    fn test_hold_reply_forces_zero_levels() {
        let d = interpret(
            &Advisory::Text("Direction: HOLD\nTake profit: 2\nStop loss: 1".to_string()),
            &oversold_snapshot(),
            SentimentScore::NEUTRAL,
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Hold);
        assert_eq!((d.take_profit_pct, d.stop_loss_pct), (0.0, 0.0));
    }

    #[test]
    fn test_parsed_levels_used() {
        let d = interpret(
            &Advisory::Text("Direction: SHORT\nTP: 2.0\nSL: 0.7".to_string()),
            &oversold_snapshot(),
            SentimentScore::NEUTRAL,
            &StrategyParams::default(),
        );
        assert_eq!(d.signal, Signal::Short);
        assert_eq!((d.take_profit_pct, d.stop_loss_pct), (2.0, 0.7));
    }

    #[test]
    fn test_rationale_insufficient_rsi() {
        let snap = IndicatorSnapshot::insufficient(100.0, 5);
        let text = rationale(&snap, SentimentScore::new(-0.5), &StrategyParams::default());
        assert_eq!(
            text,
            "RSI insufficient data, BB position: insufficient data, sentiment negative, divergence: insufficient data"
        );
    }
}
