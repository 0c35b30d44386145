//! AI decision layer — five rule-based sub-strategies plus the advisory
//! aggregator.
//!
//! Every strategy is a pure function of `(candles, features)` returning a
//! direction, a confidence normalised to 0..100, and a reason. The layer
//! classifies the market environment, pre-selects suitable strategies, and
//! emits an advisory suggestion; the decision engine always wins on a
//! disagreement and the divergence is recorded.

pub mod breakout;
pub mod grid;
pub mod mean_reversion;
pub mod scalping;
pub mod trend;

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiLayerConfig;
use crate::types::{Action, Candle, FeatureName, FeatureVector, StrategySuggestion};

/// Direction of a sub-strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Long,
    Short,
    Neutral,
}

/// One sub-strategy verdict. Confidence outside 0..100 violates the
/// normalisation contract and the signal is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub direction: SignalDirection,
    pub confidence: f64,
    pub reason: String,
}

impl StrategySignal {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            direction: SignalDirection::Neutral,
            confidence: 50.0,
            reason: reason.into(),
        }
    }
}

/// A pure rule-based sub-strategy.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, candles: &[Candle], features: &FeatureVector) -> StrategySignal;
}

/// Coarse market-environment classification used to pre-select strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEnvironment {
    pub kind: String,
    pub description: String,
    pub suitable: Vec<String>,
}

/// Output of one layer evaluation: the environment, every per-strategy
/// signal (for display), and the advisory suggestion if any strategy made
/// the cut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiLayerOutput {
    pub environment: MarketEnvironment,
    pub signals: Vec<(String, StrategySignal)>,
    pub suggestion: Option<StrategySuggestion>,
}

/// The five-strategy advisory layer.
pub struct AiDecisionLayer {
    config: AiLayerConfig,
    strategies: Vec<Box<dyn Strategy>>,
}

impl AiDecisionLayer {
    pub fn new(config: AiLayerConfig) -> Self {
        Self {
            config,
            strategies: vec![
                Box::new(trend::TrendFollowing),
                Box::new(mean_reversion::MeanReversion),
                Box::new(breakout::Breakout),
                Box::new(grid::Grid),
                Box::new(scalping::Scalping),
            ],
        }
    }

    pub fn evaluate(&self, candles: &[Candle], features: &FeatureVector) -> AiLayerOutput {
        let environment = classify_environment(features);

        let mut signals = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let signal = strategy.analyze(candles, features);
            if !(0.0..=100.0).contains(&signal.confidence) {
                warn!(
                    strategy = strategy.name(),
                    confidence = signal.confidence,
                    "confidence outside 0..100 — signal dropped"
                );
                continue;
            }
            debug!(
                strategy = strategy.name(),
                direction = ?signal.direction,
                confidence = signal.confidence,
                "strategy signal"
            );
            signals.push((strategy.name().to_string(), signal));
        }

        let suggestion = self.pick_suggestion(&environment, &signals);

        AiLayerOutput {
            environment,
            signals,
            suggestion,
        }
    }

    /// Prefer the highest-confidence directional signal from a strategy
    /// suited to the environment; fall back to the majority aggregate when
    /// no suitable strategy fired.
    fn pick_suggestion(
        &self,
        environment: &MarketEnvironment,
        signals: &[(String, StrategySignal)],
    ) -> Option<StrategySuggestion> {
        let directional: Vec<&(String, StrategySignal)> = signals
            .iter()
            .filter(|(_, s)| {
                s.direction != SignalDirection::Neutral
                    && s.confidence >= self.config.min_signal_confidence
            })
            .collect();

        if directional.is_empty() {
            return None;
        }

        let suitable: Vec<&&(String, StrategySignal)> = directional
            .iter()
            .filter(|(name, _)| environment.suitable.contains(name))
            .collect();

        if let Some((name, signal)) = suitable
            .iter()
            .max_by(|a, b| a.1.confidence.total_cmp(&b.1.confidence))
            .map(|s| **s)
        {
            return Some(StrategySuggestion {
                action: direction_to_action(signal.direction),
                confidence: signal.confidence,
                strategy: name.clone(),
                reason: signal.reason.clone(),
            });
        }

        aggregate(&directional)
    }
}

/// Majority vote over non-neutral signals with mean confidence.
fn aggregate(directional: &[&(String, StrategySignal)]) -> Option<StrategySuggestion> {
    let longs: Vec<_> = directional
        .iter()
        .filter(|(_, s)| s.direction == SignalDirection::Long)
        .collect();
    let shorts: Vec<_> = directional
        .iter()
        .filter(|(_, s)| s.direction == SignalDirection::Short)
        .collect();

    let mean = |v: &[&&(String, StrategySignal)]| {
        v.iter().map(|(_, s)| s.confidence).sum::<f64>() / v.len().max(1) as f64
    };

    if longs.len() > shorts.len() {
        Some(StrategySuggestion {
            action: Action::Long,
            confidence: mean(&longs),
            strategy: "aggregate".into(),
            reason: format!("{} of {} strategies long", longs.len(), directional.len()),
        })
    } else if shorts.len() > longs.len() {
        Some(StrategySuggestion {
            action: Action::Short,
            confidence: mean(&shorts),
            strategy: "aggregate".into(),
            reason: format!("{} of {} strategies short", shorts.len(), directional.len()),
        })
    } else {
        None
    }
}

fn direction_to_action(direction: SignalDirection) -> Action {
    match direction {
        SignalDirection::Long => Action::Long,
        SignalDirection::Short => Action::Short,
        SignalDirection::Neutral => Action::Hold,
    }
}

/// Environment classification from the vector alone.
fn classify_environment(features: &FeatureVector) -> MarketEnvironment {
    let trend = features.get(FeatureName::Trend);
    let change = features.get(FeatureName::PriceChangePct);
    let volatility = features.get(FeatureName::Volatility);

    let env = |kind: &str, description: &str, suitable: &[&str]| MarketEnvironment {
        kind: kind.into(),
        description: description.into(),
        suitable: suitable.iter().map(|s| s.to_string()).collect(),
    };

    if trend.abs() == 1.0 && change.abs() > 2.0 {
        if trend > 0.0 {
            env(
                "strong_uptrend",
                "persistent uptrend",
                &["trend_following", "breakout"],
            )
        } else {
            env(
                "strong_downtrend",
                "persistent downtrend",
                &["trend_following", "breakout"],
            )
        }
    } else if volatility > 0.03 {
        env("volatile", "high-volatility chop", &["scalping"])
    } else if trend == 0.0 && volatility < 0.025 {
        env(
            "ranging",
            "range-bound market",
            &["mean_reversion", "grid", "scalping"],
        )
    } else if change.abs() < 1.0 && volatility < 0.015 {
        env("consolidation", "tight consolidation", &["breakout", "grid"])
    } else {
        env(
            "neutral",
            "no dominant structure",
            &["trend_following", "scalping"],
        )
    }
}

// ---------------------------------------------------------------------------
// Shared candle helpers for the strategies
// ---------------------------------------------------------------------------

pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(0.0))
        .collect()
}

pub(crate) fn last_volume_above_average(candles: &[Candle], features: &FeatureVector) -> bool {
    let last = candles
        .last()
        .map(|c| c.volume.to_f64().unwrap_or(0.0))
        .unwrap_or(0.0);
    last > features.get(FeatureName::AvgVolume)
}

/// Wilder-smoothed RSI over closes, normalised to 0..1. Returns 0.5 with
/// insufficient data.
pub(crate) fn rsi_normalised(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 || period == 0 {
        return 0.5;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period]
        .iter()
        .map(|&c| c.max(0.0))
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .map(|&c| (-c).max(0.0))
        .sum::<f64>()
        / period as f64;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (period as f64 - 1.0) + c.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-c).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        return 1.0;
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)) / 100.0
}

/// Mean and population stddev of a slice.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}
