use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle. `open_ts` is unix milliseconds of the bar open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_ts: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// Order book snapshot (top-N levels).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// (price, quantity) sorted by price descending.
    pub bids: Vec<(Decimal, Decimal)>,
    /// (price, quantity) sorted by price ascending.
    pub asks: Vec<(Decimal, Decimal)>,
    pub timestamp: i64,
}

/// Network cost quote. The two legs fail independently — a `None` leg means
/// that network's fee source was unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GasQuote {
    pub eth_gwei: Option<f64>,
    pub btc_sat_vb: Option<f64>,
}

/// A single news item as returned by the news adapter (already deduplicated
/// and keyword-filtered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub published_at: i64,
    pub source: String,
    pub language: String,
}

/// Aggregated news sentiment derived from accepted items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsDigest {
    /// Aggregate score in [-100, 100].
    pub score: f64,
    /// Fraction of accepted items classified positive.
    pub pos_ratio: f64,
    /// Fraction of accepted items classified negative.
    pub neg_ratio: f64,
    /// Number of accepted items.
    pub count: usize,
    /// -1 / 0 / +1.
    pub label: i8,
}

/// Composite market sentiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// External fear & greed index, 0..100.
    pub fear_greed: f64,
    /// -1 / 0 / +1.
    pub label: i8,
    /// Composite score in [-100, 100].
    pub composite: f64,
    /// Source-reported confidence, 0..100.
    pub confidence: f64,
}

/// Macro indicator snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub dxy_change_pct: f64,
    pub sp500_change_pct: f64,
    pub vix_level: f64,
    /// 0..100; derived by the integrator when the adapter does not supply one.
    pub risk_appetite: Option<f64>,
}

/// Futures market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesSnapshot {
    pub oi_change_pct: f64,
    /// Clipped count of consecutive same-sign funding rates, in [-1, 1].
    pub funding_trend: f64,
}

/// One prediction-market contract relevant to the analysed symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionMarket {
    pub question: String,
    /// Probability-like price of the "yes" contract, 0..1.
    pub yes_price: f64,
}

/// Prediction-market snapshot with a derived composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionMarketSnapshot {
    pub markets: Vec<PredictionMarket>,
    /// Composite crowd-confidence score, 0..100.
    pub score: f64,
}

/// A single AI predictor's verdict. The integrator never branches on which
/// back-end produced it — direction and confidence are the whole contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "direction", content = "confidence", rename_all = "lowercase")]
pub enum AiPrediction {
    Up(f64),
    Down(f64),
    Flat(f64),
}

impl AiPrediction {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Up(c) | Self::Down(c) | Self::Flat(c) => *c,
        }
    }
}

/// Whatever subset of adapter results arrived for one decision request.
/// A `None` family contributes its neutral default in the integrator.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub candles: Option<Vec<Candle>>,
    pub order_book: Option<OrderBookSnapshot>,
    pub gas: Option<GasQuote>,
    pub news: Option<Vec<NewsItem>>,
    pub sentiment: Option<SentimentSnapshot>,
    pub macro_data: Option<MacroSnapshot>,
    pub futures: Option<FuturesSnapshot>,
    pub prediction_market: Option<PredictionMarketSnapshot>,
    pub ai_predictions: Option<Vec<AiPrediction>>,
}

impl MarketSnapshot {
    /// Last trade price as an exact decimal, for money math downstream.
    pub fn last_price(&self) -> Option<Decimal> {
        self.candles
            .as_ref()
            .and_then(|c| c.last())
            .map(|c| c.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_prediction_serde_tagged() {
        let p = AiPrediction::Up(80.0);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"direction\":\"up\""));
        let back: AiPrediction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_snapshot_last_price() {
        let mut snap = MarketSnapshot::default();
        assert!(snap.last_price().is_none());

        snap.candles = Some(vec![Candle {
            open_ts: 0,
            open: "100".parse().unwrap(),
            high: "101".parse().unwrap(),
            low: "99".parse().unwrap(),
            close: "100.5".parse().unwrap(),
            volume: "10".parse().unwrap(),
        }]);
        assert_eq!(snap.last_price().unwrap(), "100.5".parse::<Decimal>().unwrap());
    }
}
