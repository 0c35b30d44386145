//! Prediction-market source: crowd odds on symbol-relevant questions.
//!
//! Each relevant market contributes its "yes" price as a probability-like
//! signal; the composite score is `50 + net_direction * 50` clamped to
//! 0..100, where net direction weighs bullish-phrased questions positively
//! and bearish-phrased ones negatively.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{PredictionMarket, PredictionMarketSnapshot};

const GAMMA_MARKETS_URL: &str = "https://gamma-api.polymarket.com/markets";

const BULLISH_PHRASES: &[&str] = &["reach", "above", "hit", "exceed", "all-time high", "rise"];
const BEARISH_PHRASES: &[&str] = &["below", "drop", "fall", "crash", "dip under"];

#[async_trait]
pub trait PredictionMarketSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<PredictionMarketSnapshot>;
}

/// Polymarket gamma API client.
pub struct PolymarketSource {
    client: reqwest::Client,
}

impl PolymarketSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct GammaMarket {
    question: Option<String>,
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<String>,
    active: Option<bool>,
}

#[async_trait]
impl PredictionMarketSource for PolymarketSource {
    async fn fetch(&self, symbol: &str, _now: i64) -> Result<PredictionMarketSnapshot> {
        let markets: Vec<GammaMarket> = self
            .client
            .get(GAMMA_MARKETS_URL)
            .query(&[("limit", "100"), ("active", "true")])
            .send()
            .await
            .context("GET polymarket markets")?
            .error_for_status()
            .context("polymarket request failed")?
            .json()
            .await
            .context("parse polymarket response")?;

        let asset = symbol.trim_end_matches("USDT").to_lowercase();
        let relevant: Vec<PredictionMarket> = markets
            .into_iter()
            .filter(|m| m.active.unwrap_or(false))
            .filter_map(|m| {
                let question = m.question?;
                if !question.to_lowercase().contains(&asset)
                    && !question.to_lowercase().contains("bitcoin")
                {
                    return None;
                }
                // outcomePrices is a JSON-encoded array string: "[\"0.62\", \"0.38\"]".
                let yes_price = m
                    .outcome_prices
                    .and_then(|p| serde_json::from_str::<Vec<String>>(&p).ok())
                    .and_then(|p| p.first().and_then(|s| s.parse::<f64>().ok()))?;
                Some(PredictionMarket {
                    question,
                    yes_price,
                })
            })
            .collect();

        Ok(snapshot(relevant))
    }
}

/// Build the snapshot with the derived composite score.
pub fn snapshot(markets: Vec<PredictionMarket>) -> PredictionMarketSnapshot {
    let score = composite_score(&markets);
    PredictionMarketSnapshot { markets, score }
}

/// Direction implied by the question phrasing: +1 bullish, -1 bearish,
/// 0 unknown.
fn question_direction(question: &str) -> f64 {
    let q = question.to_lowercase();
    if BULLISH_PHRASES.iter().any(|p| q.contains(p)) {
        1.0
    } else if BEARISH_PHRASES.iter().any(|p| q.contains(p)) {
        -1.0
    } else {
        0.0
    }
}

/// `50 + net * 50` where net averages direction-signed centred yes-prices.
pub fn composite_score(markets: &[PredictionMarket]) -> f64 {
    let directed: Vec<f64> = markets
        .iter()
        .filter_map(|m| {
            let dir = question_direction(&m.question);
            if dir == 0.0 {
                None
            } else {
                // Centre the probability: 0.5 is no information.
                Some(dir * (m.yes_price - 0.5) * 2.0)
            }
        })
        .collect();

    if directed.is_empty() {
        return 50.0;
    }

    let net = directed.iter().sum::<f64>() / directed.len() as f64;
    (50.0 + net * 50.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(question: &str, yes: f64) -> PredictionMarket {
        PredictionMarket {
            question: question.into(),
            yes_price: yes,
        }
    }

    #[test]
    fn test_score_neutral_without_directed_markets() {
        assert_eq!(composite_score(&[]), 50.0);
        assert_eq!(
            composite_score(&[market("Will bitcoin remain interesting?", 0.9)]),
            50.0
        );
    }

    #[test]
    fn test_score_bullish_consensus() {
        let score = composite_score(&[
            market("Will BTC reach $100k this year?", 0.8),
            market("Will bitcoin rise above $90k?", 0.7),
        ]);
        assert!(score > 50.0);
        assert!(score <= 100.0);
    }

    #[test]
    fn test_score_bearish_question_inverts() {
        // High probability of a drop is bearish.
        let score = composite_score(&[market("Will BTC drop below $40k?", 0.9)]);
        assert!(score < 50.0);
    }
}
