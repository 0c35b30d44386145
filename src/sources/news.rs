//! News source: fetch, keyword-filter, deduplicate, and digest headlines.
//!
//! The adapter returns accepted items only — deduplicated by case-insensitive
//! title prefix and filtered against the configured keyword set. The pure
//! [`digest`] step turns accepted items into the four news features.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AdapterConfig;
use crate::types::{NewsDigest, NewsItem};

const NEWSAPI_BASE: &str = "https://newsapi.org/v2/everything";

/// Title prefix length used for deduplication.
const DEDUP_PREFIX_CHARS: usize = 50;

/// Built-in keyword set used when the config leaves `news_keywords` empty.
/// High-priority macro terms first, then market vocabulary.
const DEFAULT_KEYWORDS: &[&str] = &[
    "fed", "federal reserve", "powell", "fomc", "rate hike", "rate cut",
    "interest rate", "inflation", "cpi", "tariff", "trade war", "china",
    "treasury", "sec", "etf", "bitcoin", "btc", "ethereum", "eth", "crypto",
    "blockchain", "binance", "coinbase", "halving", "stablecoin", "defi",
    "liquidation", "futures", "perpetual",
];

/// Positive / negative polarity vocabularies for the digest.
const POSITIVE_WORDS: &[&str] = &[
    "surge", "rally", "gain", "soar", "record high", "approval", "adoption",
    "bullish", "breakout", "inflow", "up", "rise", "recover",
];
const NEGATIVE_WORDS: &[&str] = &[
    "crash", "dump", "plunge", "selloff", "ban", "hack", "lawsuit",
    "bearish", "outflow", "down", "fall", "drop", "decline", "fear",
];

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Returns accepted (filtered + deduplicated) items.
    async fn fetch(&self, symbol: &str, now: i64) -> Result<Vec<NewsItem>>;
}

/// NewsAPI-backed source. Requires `NEWS_API_KEY`; absence disables the
/// family (neutral contribution), never a hard failure.
pub struct NewsApiSource {
    client: reqwest::Client,
    api_key: String,
    keywords: Vec<String>,
}

impl NewsApiSource {
    pub fn from_env(client: reqwest::Client, config: &AdapterConfig) -> Option<Self> {
        let api_key = std::env::var("NEWS_API_KEY").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            client,
            api_key,
            keywords: effective_keywords(config),
        })
    }
}

pub fn effective_keywords(config: &AdapterConfig) -> Vec<String> {
    if config.news_keywords.is_empty() {
        DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()
    } else {
        config.news_keywords.clone()
    }
}

#[derive(Deserialize)]
struct NewsApiResponse {
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: NewsApiSourceField,
}

#[derive(Deserialize)]
struct NewsApiSourceField {
    name: Option<String>,
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn fetch(&self, symbol: &str, _now: i64) -> Result<Vec<NewsItem>> {
        let asset = symbol.trim_end_matches("USDT");
        let query = format!("{asset} OR crypto OR bitcoin");

        let resp: NewsApiResponse = self
            .client
            .get(NEWSAPI_BASE)
            .query(&[
                ("q", query.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", "50"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("GET newsapi")?
            .error_for_status()
            .context("newsapi request failed")?
            .json()
            .await
            .context("parse newsapi response")?;

        let items: Vec<NewsItem> = resp
            .articles
            .into_iter()
            .filter_map(|a| {
                let title = a.title?;
                Some(NewsItem {
                    published_at: a
                        .published_at
                        .and_then(|t| chrono::DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.timestamp_millis())
                        .unwrap_or(0),
                    summary: a.description.unwrap_or_default(),
                    source: a.source.name.unwrap_or_default(),
                    language: "en".into(),
                    title,
                })
            })
            .collect();

        Ok(accept(items, &self.keywords))
    }
}

// ---------------------------------------------------------------------------
// Pure filtering / digesting
// ---------------------------------------------------------------------------

/// Apply the keyword filter then deduplicate by title prefix.
pub fn accept(items: Vec<NewsItem>, keywords: &[String]) -> Vec<NewsItem> {
    let mut seen_prefixes: Vec<String> = Vec::new();
    let mut accepted = Vec::new();

    for item in items {
        let haystack = format!("{} {}", item.title, item.summary).to_lowercase();
        if !keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase())) {
            continue;
        }

        let prefix: String = item
            .title
            .to_lowercase()
            .chars()
            .take(DEDUP_PREFIX_CHARS)
            .collect();
        if seen_prefixes.contains(&prefix) {
            continue;
        }
        seen_prefixes.push(prefix);
        accepted.push(item);
    }

    accepted
}

/// Score accepted items into the four news features. Polarity is a simple
/// vocabulary match on title + summary; an item matching both directions
/// counts as neutral.
pub fn digest(items: &[NewsItem]) -> NewsDigest {
    if items.is_empty() {
        return NewsDigest::default();
    }

    let mut positive = 0usize;
    let mut negative = 0usize;

    for item in items {
        let text = format!("{} {}", item.title, item.summary).to_lowercase();
        let pos_hit = POSITIVE_WORDS.iter().any(|w| text.contains(w));
        let neg_hit = NEGATIVE_WORDS.iter().any(|w| text.contains(w));
        match (pos_hit, neg_hit) {
            (true, false) => positive += 1,
            (false, true) => negative += 1,
            _ => {}
        }
    }

    let count = items.len();
    let pos_ratio = positive as f64 / count as f64;
    let neg_ratio = negative as f64 / count as f64;
    let score = ((pos_ratio - neg_ratio) * 100.0).clamp(-100.0, 100.0);

    let label = if score > 20.0 {
        1
    } else if score < -20.0 {
        -1
    } else {
        0
    };

    NewsDigest {
        score,
        pos_ratio,
        neg_ratio,
        count,
        label,
    }
}
