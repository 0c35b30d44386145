//! Order book source and depth analysis.
//!
//! The snapshot feeds exactly three features: top-N imbalance, support
//! strength (bid side), and resistance strength (ask side). The strength
//! measures combine a big-wall count with overall depth relative to the
//! level average.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::OrderBookSnapshot;

const BINANCE_SPOT_BASE: &str = "https://api.binance.com";

#[async_trait]
pub trait OrderBookSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<OrderBookSnapshot>;
}

/// Binance Spot depth client.
pub struct BinanceOrderBook {
    client: reqwest::Client,
    depth: u32,
}

impl BinanceOrderBook {
    pub fn new(client: reqwest::Client, depth: u32) -> Self {
        Self { client, depth }
    }
}

#[derive(Deserialize)]
struct DepthResponse {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[async_trait]
impl OrderBookSource for BinanceOrderBook {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<OrderBookSnapshot> {
        let url = format!("{BINANCE_SPOT_BASE}/api/v3/depth");
        let limit = self.depth.to_string();
        let resp: DepthResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("limit", limit.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .context("depth request failed")?
            .json()
            .await
            .context("parse depth JSON")?;

        let parse_side = |levels: Vec<(String, String)>| -> Result<Vec<(Decimal, Decimal)>> {
            levels
                .into_iter()
                .map(|(p, q)| {
                    Ok((
                        p.parse().context("depth price not a decimal")?,
                        q.parse().context("depth quantity not a decimal")?,
                    ))
                })
                .collect()
        };

        Ok(OrderBookSnapshot {
            bids: parse_side(resp.bids)?,
            asks: parse_side(resp.asks)?,
            timestamp: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Depth analysis (pure)
// ---------------------------------------------------------------------------

/// `(bid_qty - ask_qty) / (bid_qty + ask_qty)` over the top-N levels, in
/// [-1, 1]. Positive = buy pressure.
pub fn imbalance(book: &OrderBookSnapshot) -> f64 {
    let bid_vol: Decimal = book.bids.iter().map(|(_, q)| q).sum();
    let ask_vol: Decimal = book.asks.iter().map(|(_, q)| q).sum();

    let total = bid_vol + ask_vol;
    if total == Decimal::ZERO {
        return 0.0;
    }

    ((bid_vol - ask_vol) / total)
        .to_f64()
        .unwrap_or(0.0)
        .clamp(-1.0, 1.0)
}

/// Support strength from the bid ladder, 0..100.
pub fn support_strength(book: &OrderBookSnapshot) -> f64 {
    side_strength(&book.bids)
}

/// Resistance strength from the ask ladder, 0..100.
pub fn resistance_strength(book: &OrderBookSnapshot) -> f64 {
    side_strength(&book.asks)
}

/// Wall score: each level holding more than 10x the side average counts 20,
/// capped at 50. Depth score: total quantity against a uniform ladder,
/// capped at 50.
fn side_strength(levels: &[(Decimal, Decimal)]) -> f64 {
    if levels.is_empty() {
        return 50.0;
    }

    let quantities: Vec<f64> = levels
        .iter()
        .map(|(_, q)| q.to_f64().unwrap_or(0.0))
        .collect();
    let total: f64 = quantities.iter().sum();
    let avg = total / quantities.len() as f64;
    if avg <= 0.0 {
        return 50.0;
    }

    let walls = quantities.iter().filter(|&&q| q > avg * 10.0).count();
    let wall_score = (walls as f64 * 20.0).min(50.0);
    let depth_score = (total / (avg * quantities.len() as f64) * 50.0).min(50.0);

    wall_score + depth_score
}
