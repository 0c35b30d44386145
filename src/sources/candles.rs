//! Candle (OHLCV) source.
//!
//! Contract: an ordered sequence with strictly increasing open timestamps,
//! or a failure — never a partial / shuffled series.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::types::Candle;

const BINANCE_SPOT_BASE: &str = "https://api.binance.com";

#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<Vec<Candle>>;
}

/// Binance Spot klines client.
pub struct BinanceCandles {
    client: reqwest::Client,
    interval: String,
    limit: u32,
}

impl BinanceCandles {
    pub fn new(client: reqwest::Client, interval: String, limit: u32) -> Self {
        Self {
            client,
            interval,
            limit,
        }
    }
}

#[async_trait]
impl CandleSource for BinanceCandles {
    async fn fetch(&self, symbol: &str, _now: i64) -> Result<Vec<Candle>> {
        let url = format!("{BINANCE_SPOT_BASE}/api/v3/klines");
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body, "klines request failed");
            anyhow::bail!("klines HTTP {status}");
        }

        let rows: Vec<Value> = resp.json().await.context("parse klines JSON")?;
        let candles = parse_klines(&rows)?;
        ensure_monotonic(&candles)?;
        Ok(candles)
    }
}

/// Binance klines rows are `[open_time, O, H, L, C, V, ...]` with prices as
/// strings.
pub fn parse_klines(rows: &[Value]) -> Result<Vec<Candle>> {
    let mut candles = Vec::with_capacity(rows.len());

    for row in rows {
        let fields = row
            .as_array()
            .context("kline row is not an array")?;
        if fields.len() < 6 {
            anyhow::bail!("kline row has {} fields, expected >= 6", fields.len());
        }

        let open_ts = fields[0].as_i64().context("kline open_time not an integer")?;
        let parse_price = |idx: usize, name: &str| -> Result<Decimal> {
            fields[idx]
                .as_str()
                .with_context(|| format!("kline {name} not a string"))?
                .parse()
                .with_context(|| format!("kline {name} not a decimal"))
        };

        candles.push(Candle {
            open_ts,
            open: parse_price(1, "open")?,
            high: parse_price(2, "high")?,
            low: parse_price(3, "low")?,
            close: parse_price(4, "close")?,
            volume: parse_price(5, "volume")?,
        });
    }

    Ok(candles)
}

/// Reject series with non-increasing timestamps.
pub fn ensure_monotonic(candles: &[Candle]) -> Result<()> {
    for pair in candles.windows(2) {
        if pair[1].open_ts <= pair[0].open_ts {
            anyhow::bail!(
                "non-monotonic candle timestamps: {} then {}",
                pair[0].open_ts,
                pair[1].open_ts
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_klines() {
        let rows = vec![
            json!([1700000000000i64, "100.0", "101.5", "99.5", "101.0", "12.5", 0]),
            json!([1700003600000i64, "101.0", "102.0", "100.0", "101.5", "8.0", 0]),
        ];
        let candles = parse_klines(&rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].high, "101.5".parse::<Decimal>().unwrap());
        assert_eq!(candles[1].open_ts, 1700003600000);
    }

    #[test]
    fn test_parse_klines_rejects_short_row() {
        let rows = vec![json!([1700000000000i64, "100.0"])];
        assert!(parse_klines(&rows).is_err());
    }

    #[test]
    fn test_monotonic_check() {
        let mk = |ts: i64| Candle {
            open_ts: ts,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ZERO,
        };
        assert!(ensure_monotonic(&[mk(1), mk(2), mk(3)]).is_ok());
        assert!(ensure_monotonic(&[mk(1), mk(3), mk(2)]).is_err());
        assert!(ensure_monotonic(&[mk(1), mk(1)]).is_err());
    }
}
