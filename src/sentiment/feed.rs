//! Sentiment feeds
//!
//! News and community collectors run outside this process and drop their
//! results as JSON arrays of `NewsItem`. A missing or broken file means
//! "no items this cycle", never an error.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

use super::NewsItem;

#[async_trait]
pub trait SentimentFeed: Send + Sync {
    /// Most recent items, newest first, at most `max_items`
    async fn items(&self) -> Vec<NewsItem>;
}

/// Reads `Vec<NewsItem>` from a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
    max_items: usize,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            path: path.into(),
            max_items,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl SentimentFeed for JsonFileFeed {
    async fn items(&self) -> Vec<NewsItem> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "📰 Sentiment feed unavailable");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<NewsItem>>(&raw) {
            Ok(mut items) => {
                items.truncate(self.max_items);
                items
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "📰 Sentiment feed is not valid JSON");
                Vec::new()
            }
        }
    }
}
