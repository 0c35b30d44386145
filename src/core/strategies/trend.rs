//! Trend-following: ride an established move, never chase a blow-off.

use crate::types::{Candle, FeatureName, FeatureVector};

use super::{last_volume_above_average, SignalDirection, Strategy, StrategySignal};

pub struct TrendFollowing;

impl Strategy for TrendFollowing {
    fn name(&self) -> &'static str {
        "trend_following"
    }

    fn analyze(&self, candles: &[Candle], features: &FeatureVector) -> StrategySignal {
        let trend = features.get(FeatureName::Trend);
        let change = features.get(FeatureName::PriceChangePct);
        let volatility = features.get(FeatureName::Volatility);

        let (direction, mut reason) = if trend == 1.0 && change > 1.0 {
            (SignalDirection::Long, String::from("established uptrend"))
        } else if trend == -1.0 && change < -1.0 {
            (SignalDirection::Short, String::from("established downtrend"))
        } else {
            return StrategySignal::neutral(format!(
                "no established trend (trend {trend:+.0}, change {change:+.2}%)"
            ));
        };

        let mut confidence: f64 = 70.0;

        // Moderate moves are preferred over already-extended ones.
        if change.abs() > 1.0 && change.abs() < 3.0 {
            confidence += 10.0;
            reason.push_str(", move not extended");
        } else {
            confidence += 5.0;
            reason.push_str(", move already large");
        }

        if volatility < 0.03 {
            confidence += 10.0;
            reason.push_str(", volatility contained");
        }

        if last_volume_above_average(candles, features) {
            confidence += 10.0;
            reason.push_str(", volume expanding");
        }

        StrategySignal {
            direction,
            confidence: confidence.min(100.0),
            reason,
        }
    }
}
