//! Mean-reversion: fade stretched moves back toward the rolling mean.
//!
//! Entry requires both a band breach (k standard deviations from the rolling
//! mean) and an RSI extreme, so a single indicator never triggers alone.

use crate::types::{Candle, FeatureName, FeatureVector};

use super::{closes, mean_std, rsi_normalised, SignalDirection, Strategy, StrategySignal};

const BAND_WINDOW: usize = 20;
const BAND_K: f64 = 2.0;
const RSI_PERIOD: usize = 14;
const RSI_OVERSOLD: f64 = 0.35;
const RSI_OVERBOUGHT: f64 = 0.65;

pub struct MeanReversion;

impl Strategy for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn analyze(&self, candles: &[Candle], features: &FeatureVector) -> StrategySignal {
        let closes = closes(candles);
        if closes.len() < BAND_WINDOW {
            return StrategySignal::neutral("insufficient history for the band");
        }

        let window = &closes[closes.len() - BAND_WINDOW..];
        let (mean, std) = mean_std(window);
        if std == 0.0 {
            return StrategySignal::neutral("flat window, no band");
        }

        let last = *closes.last().expect("closes non-empty");
        let rsi = rsi_normalised(&closes, RSI_PERIOD);
        let trend = features.get(FeatureName::Trend);
        let deviation = (last - mean) / std;

        let (direction, mut reason) = if deviation < -BAND_K && rsi < RSI_OVERSOLD {
            (
                SignalDirection::Long,
                format!("oversold: {deviation:.1} sigma below mean, rsi {rsi:.2}"),
            )
        } else if deviation > BAND_K && rsi > RSI_OVERBOUGHT {
            (
                SignalDirection::Short,
                format!("overbought: {deviation:.1} sigma above mean, rsi {rsi:.2}"),
            )
        } else {
            return StrategySignal::neutral(format!(
                "price within band ({deviation:+.1} sigma, rsi {rsi:.2})"
            ));
        };

        let mut confidence: f64 = 75.0;

        if deviation.abs() > BAND_K + 1.0 {
            confidence += 10.0;
            reason.push_str(", deep stretch");
        }
        if rsi < 0.25 || rsi > 0.75 {
            confidence += 10.0;
            reason.push_str(", rsi extreme");
        }

        // Reverting against a running trend is catching a falling knife.
        let against_trend = (direction == SignalDirection::Long && trend == -1.0)
            || (direction == SignalDirection::Short && trend == 1.0);
        if against_trend {
            confidence -= 15.0;
            reason.push_str(", against the running trend");
        }

        StrategySignal {
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            reason,
        }
    }
}
