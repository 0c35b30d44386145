//! Breakout: enter when price clears the recent range with volume behind it.

use rust_decimal::prelude::ToPrimitive;

use crate::types::{Candle, FeatureName, FeatureVector};

use super::{last_volume_above_average, SignalDirection, Strategy, StrategySignal};

/// Bars forming the reference range (the breakout bar itself excluded).
const RANGE_BARS: usize = 20;

pub struct Breakout;

impl Strategy for Breakout {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn analyze(&self, candles: &[Candle], features: &FeatureVector) -> StrategySignal {
        if candles.len() < RANGE_BARS + 1 {
            return StrategySignal::neutral("insufficient history for the range");
        }

        let last = candles.last().expect("candles non-empty");
        let close = last.close.to_f64().unwrap_or(0.0);

        let range = &candles[candles.len() - 1 - RANGE_BARS..candles.len() - 1];
        let range_high = range
            .iter()
            .map(|c| c.high.to_f64().unwrap_or(0.0))
            .fold(f64::NEG_INFINITY, f64::max);
        let range_low = range
            .iter()
            .map(|c| c.low.to_f64().unwrap_or(f64::INFINITY))
            .fold(f64::INFINITY, f64::min);

        let volatility = features.get(FeatureName::Volatility);
        let volume_expanding = last_volume_above_average(candles, features);

        let (direction, mut reason) = if close > range_high {
            (
                SignalDirection::Long,
                format!("close {close:.2} above the {RANGE_BARS}-bar high {range_high:.2}"),
            )
        } else if close < range_low {
            (
                SignalDirection::Short,
                format!("close {close:.2} below the {RANGE_BARS}-bar low {range_low:.2}"),
            )
        } else {
            return StrategySignal::neutral("price inside the recent range");
        };

        let mut confidence: f64 = 75.0;

        if volume_expanding {
            confidence += 10.0;
            reason.push_str(", volume expanding");
        } else {
            confidence -= 10.0;
            reason.push_str(", volume thin");
        }

        // Breakouts out of tight consolidation travel further.
        if volatility < 0.02 {
            confidence += 10.0;
            reason.push_str(", out of consolidation");
        }

        StrategySignal {
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            reason,
        }
    }
}
