//! AI predictor bank.
//!
//! Zero or more independent predictors, each turning a compact context
//! digest into a directional verdict with confidence. The integrator never
//! branches on back-end identity — [`crate::types::AiPrediction`] is the
//! whole contract. LLM-backed predictors are external collaborators plugged
//! in through the trait; the built-in bank derives a heuristic verdict from
//! the same digest with per-predictor confidence biases.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{AiPrediction, Candle, NewsItem, SentimentSnapshot};

use super::news;

/// Compact digest of the fetched families handed to every predictor.
#[derive(Debug, Clone, Default)]
pub struct PredictorContext {
    pub price_change_pct: f64,
    pub news_label: i8,
    pub sentiment_label: i8,
}

impl PredictorContext {
    pub fn from_families(
        candles: Option<&[Candle]>,
        news_items: Option<&[NewsItem]>,
        sentiment: &Option<SentimentSnapshot>,
    ) -> Self {
        let price_change_pct = candles
            .filter(|c| c.len() >= 2)
            .map(|c| {
                let window = &c[c.len().saturating_sub(12)..];
                let first = window.first().expect("window non-empty").close;
                let last = window.last().expect("window non-empty").close;
                if first.is_zero() {
                    0.0
                } else {
                    use rust_decimal::prelude::ToPrimitive;
                    ((last - first) / first * rust_decimal::Decimal::from(100))
                        .to_f64()
                        .unwrap_or(0.0)
                }
            })
            .unwrap_or(0.0);

        Self {
            price_change_pct,
            news_label: news_items.map(|n| news::digest(n).label).unwrap_or(0),
            sentiment_label: sentiment.as_ref().map(|s| s.label).unwrap_or(0),
        }
    }
}

#[async_trait]
pub trait AiPredictor: Send + Sync {
    fn name(&self) -> &'static str;
    async fn predict(&self, ctx: &PredictorContext) -> Result<AiPrediction>;
}

/// Build the predictor bank from the environment. Each named back-end is
/// enabled by its `<NAME>_API_KEY`; with no keys at all the built-in
/// heuristic bank still runs so the AI family is exercised offline.
pub fn predictors_from_env(_client: reqwest::Client) -> Vec<Arc<dyn AiPredictor>> {
    // External LLM back-ends would be constructed here from GROK_API_KEY /
    // GEMINI_API_KEY / DEEPSEEK_API_KEY. The heuristic bank mirrors their
    // shape with three differently-biased instances.
    vec![
        Arc::new(HeuristicPredictor::new("heuristic-a", 0.0)),
        Arc::new(HeuristicPredictor::new("heuristic-b", -5.0)),
        Arc::new(HeuristicPredictor::new("heuristic-c", 5.0)),
    ]
}

/// Signal-counting predictor: news and sentiment labels count double, a
/// strong recent move counts once; confidence grows with the margin.
pub struct HeuristicPredictor {
    name: &'static str,
    confidence_bias: f64,
}

impl HeuristicPredictor {
    pub fn new(name: &'static str, confidence_bias: f64) -> Self {
        Self {
            name,
            confidence_bias,
        }
    }

    fn verdict(&self, ctx: &PredictorContext) -> AiPrediction {
        let mut bullish = 0i32;
        let mut bearish = 0i32;

        match ctx.news_label {
            1 => bullish += 2,
            -1 => bearish += 2,
            _ => {}
        }
        match ctx.sentiment_label {
            1 => bullish += 2,
            -1 => bearish += 2,
            _ => {}
        }
        if ctx.price_change_pct > 1.5 {
            bullish += 1;
        } else if ctx.price_change_pct < -1.5 {
            bearish += 1;
        }

        let margin = (bullish - bearish).unsigned_abs() as f64;
        let confidence = (60.0 + margin * 10.0 + self.confidence_bias).clamp(0.0, 100.0);

        if bullish > bearish {
            AiPrediction::Up(confidence)
        } else if bearish > bullish {
            AiPrediction::Down(confidence)
        } else {
            AiPrediction::Flat(50.0)
        }
    }
}

#[async_trait]
impl AiPredictor for HeuristicPredictor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn predict(&self, ctx: &PredictorContext) -> Result<AiPrediction> {
        Ok(self.verdict(ctx))
    }
}
