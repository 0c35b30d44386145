//! Futures market source: open-interest change and funding trend.
//!
//! Funding trend is a signed count of consecutive same-sign funding rates in
//! the recent window, clipped and normalised to [-1, 1].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::FuturesSnapshot;

const BINANCE_FUTURES_BASE: &str = "https://fapi.binance.com";

/// Consecutive same-sign funding payments saturating the trend.
const FUNDING_TREND_CLIP: usize = 5;

#[async_trait]
pub trait FuturesSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<FuturesSnapshot>;
}

/// Binance USDⓈ-M futures client.
pub struct BinanceFutures {
    client: reqwest::Client,
}

impl BinanceFutures {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestRow {
    sum_open_interest: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRow {
    funding_rate: String,
}

#[async_trait]
impl FuturesSource for BinanceFutures {
    async fn fetch(&self, symbol: &str, _now: i64) -> Result<FuturesSnapshot> {
        let oi_url = format!("{BINANCE_FUTURES_BASE}/futures/data/openInterestHist");
        let funding_url = format!("{BINANCE_FUTURES_BASE}/fapi/v1/fundingRate");

        let (oi_resp, funding_resp) = tokio::join!(
            async {
                self.client
                    .get(&oi_url)
                    .query(&[("symbol", symbol), ("period", "1h"), ("limit", "25")])
                    .send()
                    .await
                    .context("GET open interest history")?
                    .error_for_status()
                    .context("open interest request failed")?
                    .json::<Vec<OpenInterestRow>>()
                    .await
                    .context("parse open interest response")
            },
            async {
                self.client
                    .get(&funding_url)
                    .query(&[("symbol", symbol), ("limit", "10")])
                    .send()
                    .await
                    .context("GET funding rates")?
                    .error_for_status()
                    .context("funding rate request failed")?
                    .json::<Vec<FundingRow>>()
                    .await
                    .context("parse funding response")
            },
        );

        let oi_rows = oi_resp?;
        let funding_rows = funding_resp?;

        let oi_values: Vec<f64> = oi_rows
            .iter()
            .filter_map(|r| r.sum_open_interest.parse().ok())
            .collect();
        let rates: Vec<f64> = funding_rows
            .iter()
            .filter_map(|r| r.funding_rate.parse().ok())
            .collect();

        Ok(FuturesSnapshot {
            oi_change_pct: oi_change_pct(&oi_values),
            funding_trend: funding_trend(&rates),
        })
    }
}

// ---------------------------------------------------------------------------
// Pure derivations
// ---------------------------------------------------------------------------

/// Percentage change from first to last open-interest sample.
pub fn oi_change_pct(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => (last - first) / first * 100.0,
        _ => 0.0,
    }
}

/// Count consecutive same-sign funding rates from the most recent backwards,
/// clip at [`FUNDING_TREND_CLIP`], normalise to [-1, 1].
pub fn funding_trend(rates: &[f64]) -> f64 {
    let last_sign = match rates.last() {
        Some(&r) if r > 0.0 => 1.0,
        Some(&r) if r < 0.0 => -1.0,
        _ => return 0.0,
    };

    let run = rates
        .iter()
        .rev()
        .take_while(|&&r| r * last_sign > 0.0)
        .count()
        .min(FUNDING_TREND_CLIP);

    last_sign * run as f64 / FUNDING_TREND_CLIP as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oi_change() {
        assert_eq!(oi_change_pct(&[100.0, 110.0]), 10.0);
        assert_eq!(oi_change_pct(&[]), 0.0);
        assert_eq!(oi_change_pct(&[0.0, 10.0]), 0.0);
    }

    #[test]
    fn test_funding_trend_positive_run() {
        // Three consecutive positive rates at the tail.
        let rates = [-0.01, 0.01, 0.02, 0.01];
        assert_eq!(funding_trend(&rates), 3.0 / 5.0);
    }

    #[test]
    fn test_funding_trend_negative_run_clipped() {
        let rates = [-0.01; 8];
        assert_eq!(funding_trend(&rates), -1.0);
    }

    #[test]
    fn test_funding_trend_zero_last_is_neutral() {
        assert_eq!(funding_trend(&[0.01, 0.0]), 0.0);
        assert_eq!(funding_trend(&[]), 0.0);
    }
}
