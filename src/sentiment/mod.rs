//! Sentiment Aggregator
//!
//! Scores news headlines and community posts into a single
//! `SentimentScore`. Korean (and other non-English) text goes through a
//! keyword rule scorer; English text goes through a `PolarityScorer`.

pub mod feed;

pub use feed::{JsonFileFeed, SentimentFeed};

use serde::{Deserialize, Serialize};

use crate::errors::{BotError, BotResult};
use crate::types::SentimentScore;

/// Language tag carried by each item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Korean,
    English,
    #[serde(other)]
    Other,
}

/// A news headline or community post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub language: Language,
}

impl NewsItem {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, language: Language) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            language,
        }
    }

    /// Text that gets scored: title and summary joined by a space
    pub fn text(&self) -> String {
        if self.summary.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.summary)
        }
    }
}

/// Scores one piece of English text into [-1, 1]
pub trait PolarityScorer: Send + Sync {
    fn polarity(&self, text: &str) -> f64;
}

const KO_POSITIVE: &[&str] = &[
    "상승", "급등", "호재", "기대", "수익", "성장", "호황", "기록", "최고", "강세",
];
const KO_NEGATIVE: &[&str] = &[
    "하락", "급락", "규제", "불안", "리스크", "패닉", "부정", "폭락", "제재", "손실",
];

/// +0.5 per positive keyword present, -0.5 per negative keyword present
#[derive(Debug, Clone)]
pub struct KeywordRuleScorer {
    positive: Vec<&'static str>,
    negative: Vec<&'static str>,
    weight: f64,
}

impl Default for KeywordRuleScorer {
    fn default() -> Self {
        Self {
            positive: KO_POSITIVE.to_vec(),
            negative: KO_NEGATIVE.to_vec(),
            weight: 0.5,
        }
    }
}

impl KeywordRuleScorer {
    pub fn score(&self, text: &str) -> f64 {
        let pos = self.positive.iter().filter(|k| text.contains(**k)).count() as f64;
        let neg = self.negative.iter().filter(|k| text.contains(**k)).count() as f64;
        ((pos - neg) * self.weight).clamp(-1.0, 1.0)
    }
}

const EN_POSITIVE: &[&str] = &[
    "surge", "surges", "soar", "soars", "rally", "rallies", "gain", "gains", "bull", "bullish",
    "record", "high", "growth", "approve", "approved", "approval", "adoption", "inflow",
    "inflows", "breakout", "rebound", "recovers", "recovery", "upgrade", "profit", "strong",
    "optimism", "optimistic", "positive", "boost", "jump", "jumps", "rise", "rises",
];
const EN_NEGATIVE: &[&str] = &[
    "crash", "crashes", "plunge", "plunges", "drop", "drops", "fall", "falls", "bear",
    "bearish", "ban", "banned", "hack", "hacked", "exploit", "lawsuit", "sue", "sued",
    "fraud", "outflow", "outflows", "selloff", "sell-off", "liquidation", "liquidations",
    "fear", "panic", "loss", "losses", "weak", "reject", "rejected", "crackdown", "risk",
    "decline", "declines", "slump", "negative",
];
const EN_NEGATIONS: &[&str] = &["not", "no", "never", "without", "isn't", "wasn't", "don't", "doesn't"];

/// Financial-tone lexicon scorer with one-word negation flipping
#[derive(Debug, Clone, Default)]
pub struct LexiconPolarityScorer;

impl PolarityScorer for LexiconPolarityScorer {
    fn polarity(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
            .filter(|w| !w.is_empty())
            .collect();

        let mut pos = 0.0;
        let mut neg = 0.0;
        for (i, word) in words.iter().enumerate() {
            let negated = i > 0 && EN_NEGATIONS.contains(&words[i - 1]);
            let hit = if EN_POSITIVE.contains(word) {
                1.0
            } else if EN_NEGATIVE.contains(word) {
                -1.0
            } else {
                continue;
            };
            let hit = if negated { -hit } else { hit };
            if hit > 0.0 {
                pos += 1.0;
            } else {
                neg += 1.0;
            }
        }

        if pos + neg == 0.0 {
            0.0
        } else {
            (pos - neg) / (pos + neg)
        }
    }
}

/// Mean polarity over a batch of items
pub struct SentimentAggregator {
    keyword: KeywordRuleScorer,
    polarity: Box<dyn PolarityScorer>,
}

impl Default for SentimentAggregator {
    fn default() -> Self {
        Self::new(Box::new(LexiconPolarityScorer))
    }
}

impl SentimentAggregator {
    pub fn new(polarity: Box<dyn PolarityScorer>) -> Self {
        Self {
            keyword: KeywordRuleScorer::default(),
            polarity,
        }
    }

    /// Score a single item
    pub fn score_item(&self, item: &NewsItem) -> BotResult<f64> {
        let text = item.text();
        if text.trim().is_empty() {
            return Err(BotError::Unscorable {
                reason: "empty text".to_string(),
            });
        }

        let score = match item.language {
            Language::English => self.polarity.polarity(&text),
            Language::Korean | Language::Other => self.keyword.score(&text),
        };

        if !score.is_finite() {
            return Err(BotError::Unscorable {
                reason: format!("non-finite score for '{}'", item.title),
            });
        }
        Ok(score.clamp(-1.0, 1.0))
    }

    /// Mean of the scorable items, neutral when none are scorable
    pub fn aggregate(&self, items: &[NewsItem]) -> SentimentScore {
        let scores: Vec<f64> = items
            .iter()
            .filter_map(|item| match self.score_item(item) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::debug!(title = %item.title, error = %e, "Skipping unscorable item");
                    None
                }
            })
            .collect();

        if scores.is_empty() {
            return SentimentScore::NEUTRAL;
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let score = SentimentScore::new(mean);
        tracing::debug!(items = items.len(), scored = scores.len(), score = %score, "Sentiment aggregated");
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ko(title: &str) -> NewsItem {
        NewsItem::new(title, "", Language::Korean)
    }

    fn en(title: &str) -> NewsItem {
        NewsItem::new(title, "", Language::English)
    }

    #[test]
    fn test_empty_batch_is_neutral() {
        let agg = SentimentAggregator::default();
        assert_eq!(agg.aggregate(&[]), SentimentScore::NEUTRAL);
    }

    #[test]
    fn test_korean_keywords() {
        let agg = SentimentAggregator::default();
        assert_eq!(agg.score_item(&ko("비트코인 급등")).unwrap(), 0.5);
        assert_eq!(agg.score_item(&ko("비트코인 급락, 규제 불안")).unwrap(), -1.0);
        assert_eq!(agg.score_item(&ko("비트코인 거래량 보합")).unwrap(), 0.0);
    }

    #[test]
    fn test_korean_score_is_clamped() {
        let agg = SentimentAggregator::default();
        let s = agg.score_item(&ko("상승 급등 호재 기대 수익")).unwrap();
        assert_eq!(s, 1.0);
    }

    #[test]
    fn test_english_polarity() {
        let agg = SentimentAggregator::default();
        assert!(agg.score_item(&en("Bitcoin surges to record high")).unwrap() > 0.0);
        assert!(agg.score_item(&en("Exchange hacked, prices crash")).unwrap() < 0.0);
        assert_eq!(agg.score_item(&en("Markets open on Monday")).unwrap(), 0.0);
    }

    #[test]
    fn test_english_negation_flips() {
        let scorer = LexiconPolarityScorer;
        assert!(scorer.polarity("ETF not approved") < 0.0);
    }

    #[test]
    fn test_unscorable_items_skipped() {
        let agg = SentimentAggregator::default();
        let items = vec![ko("   "), ko("비트코인 급등")];
        assert_eq!(agg.aggregate(&items).value(), 0.5);
    }

    #[test]
    fn test_aggregate_is_mean() {
        let agg = SentimentAggregator::default();
        let items = vec![ko("급등"), ko("급락"), ko("호재 기대")];
        // (0.5 - 0.5 + 1.0) / 3
        assert!((agg.aggregate(&items).value() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_custom_polarity_scorer_is_used() {
        struct Always(f64);
        impl PolarityScorer for Always {
            fn polarity(&self, _text: &str) -> f64 {
                self.0
            }
        }
        let agg = SentimentAggregator::new(Box::new(Always(5.0)));
        assert_eq!(agg.aggregate(&[en("anything")]).value(), 1.0);
    }

    #[test]
    fn test_item_deserializes_with_defaults() {
        let item: NewsItem = serde_json::from_str(r#"{"title":"비트코인 상승"}"#).unwrap();
        assert_eq!(item.language, Language::Korean);
        assert_eq!(item.text(), "비트코인 상승");

        let item: NewsItem =
            serde_json::from_str(r#"{"title":"x","summary":"y","language":"ja"}"#).unwrap();
        assert_eq!(item.language, Language::Other);
    }
}
