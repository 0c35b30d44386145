//! Market sentiment source: fear & greed index plus a composite score.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::SentimentSnapshot;

const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/";

#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<SentimentSnapshot>;
}

/// alternative.me fear & greed client. The composite score rescales the
/// index to [-100, 100]; the label applies a ±20 neutral band.
pub struct AlternativeMeSentiment {
    client: reqwest::Client,
}

impl AlternativeMeSentiment {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Deserialize)]
struct FngEntry {
    value: String,
}

#[async_trait]
impl SentimentSource for AlternativeMeSentiment {
    async fn fetch(&self, _symbol: &str, _now: i64) -> Result<SentimentSnapshot> {
        let resp: FngResponse = self
            .client
            .get(FEAR_GREED_URL)
            .send()
            .await
            .context("GET fear & greed index")?
            .json()
            .await
            .context("parse fear & greed response")?;

        let entry = resp.data.first().context("fear & greed data empty")?;
        let value: f64 = entry.value.parse().context("fear & greed value not a number")?;

        Ok(snapshot_from_index(value))
    }
}

/// Derive the full snapshot from the raw 0..100 index.
pub fn snapshot_from_index(fear_greed: f64) -> SentimentSnapshot {
    let fear_greed = fear_greed.clamp(0.0, 100.0);
    let composite = (fear_greed - 50.0) * 2.0;

    let label = if composite > 20.0 {
        1
    } else if composite < -20.0 {
        -1
    } else {
        0
    };

    SentimentSnapshot {
        fear_greed,
        label,
        composite,
        confidence: composite.abs(),
    }
}
