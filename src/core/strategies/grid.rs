//! Grid: high-low box trading inside a calm range. Never fires when the
//! market is moving fast enough to trend out of the box.

use crate::types::{Candle, FeatureName, FeatureVector};

use super::{SignalDirection, Strategy, StrategySignal};

/// Volatility above this disables the strategy outright.
const MAX_VOLATILITY: f64 = 0.03;
/// Absolute window change above this disables the strategy outright.
const MAX_CHANGE_PCT: f64 = 3.0;

const BUY_ZONE: f64 = 0.3;
const SELL_ZONE: f64 = 0.7;

pub struct Grid;

impl Strategy for Grid {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn analyze(&self, _candles: &[Candle], features: &FeatureVector) -> StrategySignal {
        let volatility = features.get(FeatureName::Volatility);
        let change = features.get(FeatureName::PriceChangePct);
        let trend = features.get(FeatureName::Trend);

        if volatility > MAX_VOLATILITY || change.abs() > MAX_CHANGE_PCT {
            return StrategySignal {
                direction: SignalDirection::Neutral,
                confidence: 0.0,
                reason: "market too volatile for a grid box".into(),
            };
        }

        let high = features.get(FeatureName::HighPrice);
        let low = features.get(FeatureName::LowPrice);
        let price = features.get(FeatureName::CurrentPrice);
        if high <= low {
            return StrategySignal::neutral("degenerate box");
        }

        let position = (price - low) / (high - low);

        let (direction, mut reason, mut confidence): (_, _, f64) = if position < BUY_ZONE {
            (
                SignalDirection::Long,
                format!("price at {:.0}% of the box", position * 100.0),
                70.0,
            )
        } else if position > SELL_ZONE {
            (
                SignalDirection::Short,
                format!("price at {:.0}% of the box", position * 100.0),
                70.0,
            )
        } else {
            return StrategySignal::neutral(format!(
                "price mid-box ({:.0}%), waiting for a grid line",
                position * 100.0
            ));
        };

        if position < 0.2 || position > 0.8 {
            confidence += 10.0;
            reason.push_str(", extreme of the box");
        }

        // A directional market erodes the box assumption.
        if trend != 0.0 {
            confidence -= 15.0;
            reason.push_str(", trending against the box");
        }

        StrategySignal {
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(price: f64, low: f64, high: f64, volatility: f64, change: f64) -> FeatureVector {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::CurrentPrice, price);
        v.set(FeatureName::LowPrice, low);
        v.set(FeatureName::HighPrice, high);
        v.set(FeatureName::Volatility, volatility);
        v.set(FeatureName::PriceChangePct, change);
        v
    }

    #[test]
    fn test_long_at_box_bottom() {
        let signal = Grid.analyze(&[], &features(101.0, 100.0, 110.0, 0.01, 0.5));
        assert_eq!(signal.direction, SignalDirection::Long);
        assert!(signal.confidence >= 70.0);
    }

    #[test]
    fn test_short_at_box_top() {
        let signal = Grid.analyze(&[], &features(109.0, 100.0, 110.0, 0.01, 0.5));
        assert_eq!(signal.direction, SignalDirection::Short);
    }

    #[test]
    fn test_neutral_mid_box() {
        let signal = Grid.analyze(&[], &features(105.0, 100.0, 110.0, 0.01, 0.5));
        assert_eq!(signal.direction, SignalDirection::Neutral);
    }

    #[test]
    fn test_disabled_in_high_volatility() {
        let signal = Grid.analyze(&[], &features(101.0, 100.0, 110.0, 0.05, 0.5));
        assert_eq!(signal.direction, SignalDirection::Neutral);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_disabled_on_fast_move() {
        let signal = Grid.analyze(&[], &features(101.0, 100.0, 110.0, 0.01, 4.0));
        assert_eq!(signal.direction, SignalDirection::Neutral);
        assert_eq!(signal.confidence, 0.0);
    }
}
