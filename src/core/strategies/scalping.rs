//! Scalping: two-bar momentum with rising volume and a thin bar spread.
//! Cost-sensitive — stands down entirely when network fees are elevated.

use rust_decimal::prelude::ToPrimitive;

use crate::types::{Candle, FeatureName, FeatureVector};

use super::{SignalDirection, Strategy, StrategySignal};

/// Gas above this makes round-trip costs eat the edge.
const MAX_ETH_GAS_GWEI: f64 = 25.0;
/// Last-bar high-low spread as a fraction of close; thin bars only.
const MAX_BAR_SPREAD: f64 = 0.01;

pub struct Scalping;

impl Strategy for Scalping {
    fn name(&self) -> &'static str {
        "scalping"
    }

    fn analyze(&self, candles: &[Candle], features: &FeatureVector) -> StrategySignal {
        let eth_gas = features.get(FeatureName::EthGas);
        if eth_gas > MAX_ETH_GAS_GWEI {
            return StrategySignal {
                direction: SignalDirection::Neutral,
                confidence: 0.0,
                reason: format!("fees too high for scalps ({eth_gas:.0} gwei)"),
            };
        }

        if candles.len() < 3 {
            return StrategySignal::neutral("insufficient bars");
        }

        let last = &candles[candles.len() - 1];
        let prev = &candles[candles.len() - 2];
        let before = &candles[candles.len() - 3];

        let close = last.close.to_f64().unwrap_or(0.0);
        if close <= 0.0 {
            return StrategySignal::neutral("no price");
        }

        let spread = (last.high - last.low).to_f64().unwrap_or(f64::INFINITY) / close;
        if spread > MAX_BAR_SPREAD {
            return StrategySignal::neutral(format!(
                "bar spread {:.2}% too wide for a scalp",
                spread * 100.0
            ));
        }

        let up_tick = last.close > prev.close && prev.close > before.close;
        let down_tick = last.close < prev.close && prev.close < before.close;
        let volume_rising = last.volume > prev.volume;

        let (direction, mut reason) = if up_tick && volume_rising {
            (SignalDirection::Long, String::from("two-bar up-tick on rising volume"))
        } else if down_tick && volume_rising {
            (SignalDirection::Short, String::from("two-bar down-tick on rising volume"))
        } else {
            return StrategySignal::neutral("no clean two-bar impulse");
        };

        let mut confidence: f64 = 70.0;

        let volatility = features.get(FeatureName::Volatility);
        if volatility > 0.01 && volatility < 0.025 {
            confidence += 15.0;
            reason.push_str(", workable volatility");
        }

        if spread < MAX_BAR_SPREAD / 2.0 {
            confidence += 10.0;
            reason.push_str(", tight spread");
        }

        StrategySignal {
            direction,
            confidence: confidence.min(100.0),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn candle(close: f64, volume: f64) -> Candle {
        let d = |v: f64| Decimal::try_from(v).unwrap();
        Candle {
            open_ts: 0,
            open: d(close),
            high: d(close * 1.002),
            low: d(close * 0.998),
            close: d(close),
            volume: d(volume),
        }
    }

    fn features(eth_gas: f64, volatility: f64) -> FeatureVector {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::EthGas, eth_gas);
        v.set(FeatureName::Volatility, volatility);
        v
    }

    #[test]
    fn test_long_on_uptick_with_volume() {
        let candles = vec![candle(100.0, 50.0), candle(100.2, 60.0), candle(100.5, 80.0)];
        let signal = Scalping.analyze(&candles, &features(10.0, 0.015));
        assert_eq!(signal.direction, SignalDirection::Long);
        assert!(signal.confidence >= 85.0);
    }

    #[test]
    fn test_short_on_downtick() {
        let candles = vec![candle(100.5, 50.0), candle(100.2, 60.0), candle(100.0, 80.0)];
        let signal = Scalping.analyze(&candles, &features(10.0, 0.015));
        assert_eq!(signal.direction, SignalDirection::Short);
    }

    #[test]
    fn test_stands_down_on_high_gas() {
        let candles = vec![candle(100.0, 50.0), candle(100.2, 60.0), candle(100.5, 80.0)];
        let signal = Scalping.analyze(&candles, &features(60.0, 0.015));
        assert_eq!(signal.direction, SignalDirection::Neutral);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_no_impulse_without_rising_volume() {
        let candles = vec![candle(100.0, 80.0), candle(100.2, 60.0), candle(100.5, 50.0)];
        let signal = Scalping.analyze(&candles, &features(10.0, 0.015));
        assert_eq!(signal.direction, SignalDirection::Neutral);
    }
}
