use anyhow::{bail, Result};
use rust_decimal::Decimal;

use super::types::PilotConfig;

/// Cross-field validation. Fail fast at startup rather than mid-decision.
pub fn validate_config(config: &PilotConfig) -> Result<()> {
    // -- Weights ------------------------------------------------------------
    let w = &config.weights;
    for (name, val) in [
        ("news", w.news),
        ("price", w.price),
        ("sentiment", w.sentiment),
        ("ai", w.ai),
    ] {
        if !(0.0..=1.0).contains(&val) {
            bail!("weights.{name} = {val} outside 0..1");
        }
    }
    let sum = w.news + w.price + w.sentiment + w.ai;
    if (sum - 1.0).abs() > 1e-9 {
        bail!("category weights sum to {sum}, expected 1.0");
    }

    // -- Thresholds ---------------------------------------------------------
    let t = &config.thresholds;
    if t.sell_score >= t.buy_score {
        bail!(
            "thresholds.sell_score ({}) must be below buy_score ({})",
            t.sell_score,
            t.buy_score
        );
    }
    if !(0.0..=1.0).contains(&t.min_consistency) {
        bail!("thresholds.min_consistency outside 0..1");
    }

    // -- Risk ---------------------------------------------------------------
    let r = &config.risk;
    if r.risk_percent <= Decimal::ZERO || r.risk_percent >= Decimal::ONE {
        bail!("risk.risk_percent must be a fraction 0 < r < 1");
    }
    if r.leverage == 0 {
        bail!("risk.leverage must be >= 1");
    }
    if r.max_position_fraction <= Decimal::ZERO || r.max_position_fraction > Decimal::ONE {
        bail!("risk.max_position_fraction must be in (0, 1]");
    }
    if let Some(sl) = r.stop_loss_pct {
        if sl <= Decimal::ZERO || sl >= Decimal::ONE {
            bail!("risk.stop_loss_pct must be a fraction 0 < s < 1");
        }
    }

    // -- Gates --------------------------------------------------------------
    let g = &config.gates;
    if g.fear_greed_floor >= g.fear_greed_ceil {
        bail!("gates fear/greed band is empty");
    }
    if g.max_volatility <= 0.0 {
        bail!("gates.max_volatility must be positive");
    }

    // -- Features -----------------------------------------------------------
    let f = &config.features;
    if f.candle_window < 8 {
        bail!("features.candle_window must be >= 8");
    }
    if f.trend_ma_short >= f.trend_ma_long {
        bail!("features.trend_ma_short must be below trend_ma_long");
    }

    // -- Dynamic multipliers ------------------------------------------------
    for (regime, table) in &config.dynamic_weights.multipliers {
        for (category, mult) in table {
            if *mult <= 0.0 {
                bail!("dynamic multiplier {regime}.{category} = {mult} must be positive");
            }
        }
    }

    // -- Backtest -----------------------------------------------------------
    let b = &config.backtest;
    if b.window_bars < 8 {
        bail!("backtest.window_bars must be >= 8");
    }
    if b.max_hold_bars == 0 {
        bail!("backtest.max_hold_bars must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_enforced() {
        let mut config = PilotConfig::default();
        config.weights.news = 0.5; // sum now 1.2
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sum"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = PilotConfig::default();
        config.thresholds.sell_score = 80.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_leverage_rejected() {
        let mut config = PilotConfig::default();
        config.risk.leverage = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_risk_percent_must_be_fraction() {
        let mut config = PilotConfig::default();
        config.risk.risk_percent = "1.5".parse().unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_short_candle_window_rejected() {
        let mut config = PilotConfig::default();
        config.features.candle_window = 4;
        assert!(validate_config(&config).is_err());
    }
}
