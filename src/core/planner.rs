//! Position planner — turns a non-HOLD decision into an executable plan.
//!
//! Sizing is risk-first: the stop distance fixes how many base units a
//! risk budget buys, and the three take-profit tiers at 1.5x / 2.5x / 4.0x
//! the stop distance closing 50/30/20 % pin the expected payoff at 2.3x the
//! risked amount. All money math is exact `Decimal`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::config::RiskConfig;
use crate::constants;
use crate::errors::PilotError;
use crate::types::{PositionPlan, Side, TpLevel};

/// Risk-first position sizing with a hard position-value cap.
pub struct PositionPlanner {
    config: RiskConfig,
}

impl PositionPlanner {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Compute the full plan.
    ///
    /// `volatility` drives the stop percent when the config does not pin
    /// one. Non-positive entry, balance, or leverage is an error — the
    /// caller downgrades the decision to HOLD.
    pub fn plan(
        &self,
        side: Side,
        entry_price: Decimal,
        volatility: f64,
        balance: Decimal,
    ) -> Result<PositionPlan, PilotError> {
        if entry_price <= Decimal::ZERO {
            return Err(PilotError::PlannerFailed {
                reason: format!("non-positive entry price {entry_price}"),
            });
        }
        if balance <= Decimal::ZERO {
            return Err(PilotError::PlannerFailed {
                reason: format!("non-positive balance {balance}"),
            });
        }
        if self.config.leverage == 0 {
            return Err(PilotError::PlannerFailed {
                reason: "zero leverage".into(),
            });
        }

        let stop_pct = self
            .config
            .stop_loss_pct
            .unwrap_or_else(|| stop_pct_for_volatility(volatility));

        let stop_distance = entry_price * stop_pct;
        let stop_loss = match side {
            Side::Long => entry_price - stop_distance,
            Side::Short => entry_price + stop_distance,
        };

        // Risk-first sizing: the stop distance fixes the unit count.
        let risk_amount = balance * self.config.risk_percent;
        let mut size_base = risk_amount / stop_distance;
        let mut size_quote = size_base * entry_price;
        let mut effective_risk_percent = self.config.risk_percent;

        // Position-value cap; when it binds, recompute the actual risk.
        let leverage_dec = Decimal::from(self.config.leverage);
        let cap = balance * self.config.max_position_fraction * leverage_dec;
        if size_quote > cap {
            size_base = cap / entry_price;
            size_quote = cap;
            effective_risk_percent = size_base * stop_distance / balance;
            warn!(
                %cap,
                effective_risk_pct = %(effective_risk_percent * dec!(100)),
                "position cap bound the size"
            );
        }

        let actual_risk = size_base * stop_distance;
        let margin = size_quote / leverage_dec;

        let take_profits = tp_levels(side, entry_price, stop_distance);

        // Weighted tier payoff: 0.5*1.5 + 0.3*2.5 + 0.2*4.0 = 2.3.
        let payoff_mult: Decimal = constants::TP_DISTANCE_MULTS
            .iter()
            .zip(constants::TP_CLOSE_FRACTIONS.iter())
            .map(|(d, f)| {
                d.parse::<Decimal>().expect("const decimal")
                    * f.parse::<Decimal>().expect("const decimal")
            })
            .sum();

        Ok(PositionPlan {
            side,
            entry_price,
            stop_loss,
            stop_loss_pct: stop_pct,
            take_profits,
            size_base,
            size_quote,
            margin,
            leverage: self.config.leverage,
            risk_amount: actual_risk,
            effective_risk_percent,
            max_loss: -actual_risk,
            expected_profit: actual_risk * payoff_mult,
            risk_reward_ratio: payoff_mult,
        })
    }
}

/// Volatility-banded stop percent: wider stops in choppier markets.
pub fn stop_pct_for_volatility(volatility: f64) -> Decimal {
    if volatility < 0.01 {
        dec!(0.015)
    } else if volatility < 0.02 {
        dec!(0.020)
    } else if volatility < 0.03 {
        dec!(0.025)
    } else {
        dec!(0.030)
    }
}

fn tp_levels(side: Side, entry: Decimal, stop_distance: Decimal) -> [TpLevel; 3] {
    let mut levels = [TpLevel {
        price: Decimal::ZERO,
        close_fraction: Decimal::ZERO,
    }; 3];

    for (i, (dist, fraction)) in constants::TP_DISTANCE_MULTS
        .iter()
        .zip(constants::TP_CLOSE_FRACTIONS.iter())
        .enumerate()
    {
        let dist: Decimal = dist.parse().expect("const decimal");
        let fraction: Decimal = fraction.parse().expect("const decimal");
        let offset = stop_distance * dist;
        levels[i] = TpLevel {
            price: match side {
                Side::Long => entry + offset,
                Side::Short => entry - offset,
            },
            close_fraction: fraction,
        };
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> PositionPlanner {
        PositionPlanner::new(RiskConfig::default())
    }

    #[test]
    fn test_reference_long_plan() {
        // balance 10_000, risk 1.5 %, leverage 10, entry 50_000, vol 1.2 %.
        let plan = planner()
            .plan(Side::Long, dec!(50_000), 0.012, dec!(10_000))
            .unwrap();

        assert_eq!(plan.stop_loss_pct, dec!(0.020));
        assert_eq!(plan.stop_loss, dec!(49_000));
        assert_eq!(plan.take_profits[0].price, dec!(51_500));
        assert_eq!(plan.take_profits[1].price, dec!(52_500));
        assert_eq!(plan.take_profits[2].price, dec!(54_000));
        assert_eq!(plan.size_base, dec!(0.15));
        assert_eq!(plan.size_quote, dec!(7_500));
        assert_eq!(plan.margin, dec!(750));
        assert_eq!(plan.risk_amount, dec!(150));
        assert_eq!(plan.max_loss, dec!(-150));
        assert_eq!(plan.expected_profit, dec!(345));
        assert_eq!(plan.risk_reward_ratio, dec!(2.3));
    }

    #[test]
    fn test_long_geometry() {
        let plan = planner()
            .plan(Side::Long, dec!(50_000), 0.02, dec!(10_000))
            .unwrap();
        assert!(plan.stop_loss < plan.entry_price);
        assert!(plan.entry_price < plan.take_profits[0].price);
        assert!(plan.take_profits[0].price < plan.take_profits[1].price);
        assert!(plan.take_profits[1].price < plan.take_profits[2].price);
    }

    #[test]
    fn test_short_geometry() {
        let plan = planner()
            .plan(Side::Short, dec!(50_000), 0.02, dec!(10_000))
            .unwrap();
        assert!(plan.stop_loss > plan.entry_price);
        assert!(plan.entry_price > plan.take_profits[0].price);
        assert!(plan.take_profits[0].price > plan.take_profits[1].price);
        assert!(plan.take_profits[1].price > plan.take_profits[2].price);
    }

    #[test]
    fn test_close_fractions_sum_to_one() {
        let plan = planner()
            .plan(Side::Long, dec!(100), 0.02, dec!(1_000))
            .unwrap();
        let sum: Decimal = plan.take_profits.iter().map(|tp| tp.close_fraction).sum();
        assert_eq!(sum, Decimal::ONE);
        assert_eq!(plan.take_profits[0].close_fraction, dec!(0.5));
        assert_eq!(plan.take_profits[1].close_fraction, dec!(0.3));
        assert_eq!(plan.take_profits[2].close_fraction, dec!(0.2));
    }

    #[test]
    fn test_volatility_bands() {
        assert_eq!(stop_pct_for_volatility(0.005), dec!(0.015));
        assert_eq!(stop_pct_for_volatility(0.015), dec!(0.020));
        assert_eq!(stop_pct_for_volatility(0.025), dec!(0.025));
        assert_eq!(stop_pct_for_volatility(0.05), dec!(0.030));
    }

    #[test]
    fn test_cap_binds_and_risk_recomputed() {
        // Tiny stop percent forces an enormous uncapped size.
        let mut config = RiskConfig::default();
        config.stop_loss_pct = Some(dec!(0.001));
        let planner = PositionPlanner::new(config);

        let balance = dec!(10_000);
        let plan = planner.plan(Side::Long, dec!(100), 0.0, balance).unwrap();

        let cap = balance * dec!(0.15) * dec!(10);
        assert_eq!(plan.size_quote, cap);
        assert!(plan.effective_risk_percent < dec!(0.015));
        // Stop fill on the capped size loses exactly the recomputed risk.
        assert_eq!(plan.risk_amount, plan.effective_risk_percent * balance);
    }

    #[test]
    fn test_stop_fill_loses_risk_amount() {
        let plan = planner()
            .plan(Side::Long, dec!(50_000), 0.012, dec!(10_000))
            .unwrap();
        let pnl = (plan.stop_loss - plan.entry_price) * plan.size_base;
        assert_eq!(pnl, -plan.risk_amount);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(planner().plan(Side::Long, dec!(0), 0.02, dec!(1_000)).is_err());
        assert!(planner().plan(Side::Long, dec!(-5), 0.02, dec!(1_000)).is_err());
        assert!(planner().plan(Side::Long, dec!(100), 0.02, dec!(0)).is_err());
    }

    #[test]
    fn test_user_stop_override() {
        let mut config = RiskConfig::default();
        config.stop_loss_pct = Some(dec!(0.05));
        let planner = PositionPlanner::new(config);
        let plan = planner.plan(Side::Long, dec!(100), 0.001, dec!(10_000)).unwrap();
        // Override wins regardless of the volatility band.
        assert_eq!(plan.stop_loss_pct, dec!(0.05));
        assert_eq!(plan.stop_loss, dec!(95));
    }
}
