//! Macro indicator source: dollar index, S&P 500, VIX.
//!
//! `risk_appetite` is left unset here; the integrator derives it from
//! sp500/vix with the documented monotone formula when the source does not
//! supply one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::types::MacroSnapshot;

const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[async_trait]
pub trait MacroSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<MacroSnapshot>;
}

/// Yahoo Finance chart client for the three macro tickers. Individual
/// tickers degrade to their neutral value; the family fails only when all
/// three are unavailable.
pub struct YahooMacroSource {
    client: reqwest::Client,
}

impl YahooMacroSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    indicators: ChartIndicators,
}

#[derive(Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize)]
struct ChartQuote {
    close: Vec<Option<f64>>,
}

#[async_trait]
impl MacroSource for YahooMacroSource {
    async fn fetch(&self, _symbol: &str, _now: i64) -> Result<MacroSnapshot> {
        let (dxy, sp500, vix) = tokio::join!(
            self.daily_change_pct("DX-Y.NYB"),
            self.daily_change_pct("^GSPC"),
            self.last_close("^VIX"),
        );

        let failures = [dxy.is_err(), sp500.is_err(), vix.is_err()]
            .iter()
            .filter(|f| **f)
            .count();
        if failures == 3 {
            anyhow::bail!("all macro tickers unavailable");
        }

        Ok(MacroSnapshot {
            dxy_change_pct: dxy
                .map_err(|e| debug!(error = %e, "dxy leg failed"))
                .unwrap_or(0.0),
            sp500_change_pct: sp500
                .map_err(|e| debug!(error = %e, "sp500 leg failed"))
                .unwrap_or(0.0),
            vix_level: vix
                .map_err(|e| debug!(error = %e, "vix leg failed"))
                .unwrap_or(20.0),
            risk_appetite: None,
        })
    }
}

impl YahooMacroSource {
    async fn closes(&self, ticker: &str) -> Result<Vec<f64>> {
        let url = format!("{YAHOO_CHART_BASE}/{ticker}");
        let resp: ChartResponse = self
            .client
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await
            .with_context(|| format!("GET chart for {ticker}"))?
            .error_for_status()
            .with_context(|| format!("chart request for {ticker} failed"))?
            .json()
            .await
            .with_context(|| format!("parse chart for {ticker}"))?;

        let closes: Vec<f64> = resp
            .chart
            .result
            .and_then(|mut r| r.pop())
            .and_then(|r| r.indicators.quote.into_iter().next())
            .map(|q| q.close.into_iter().flatten().collect())
            .unwrap_or_default();

        if closes.is_empty() {
            anyhow::bail!("no closes for {ticker}");
        }
        Ok(closes)
    }

    async fn daily_change_pct(&self, ticker: &str) -> Result<f64> {
        let closes = self.closes(ticker).await?;
        if closes.len() < 2 {
            anyhow::bail!("not enough closes for {ticker}");
        }
        let prev = closes[closes.len() - 2];
        let last = closes[closes.len() - 1];
        if prev == 0.0 {
            anyhow::bail!("zero previous close for {ticker}");
        }
        Ok((last - prev) / prev * 100.0)
    }

    async fn last_close(&self, ticker: &str) -> Result<f64> {
        let closes = self.closes(ticker).await?;
        Ok(*closes.last().expect("closes checked non-empty"))
    }
}
