use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a planned position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

/// One take-profit tier: target price plus the fraction of the position
/// closed when it fills.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close_fraction: Decimal,
}

/// Fully-specified executable plan derived from a non-HOLD decision.
///
/// Geometry invariant: LONG satisfies `stop_loss < entry < tp1 < tp2 < tp3`;
/// SHORT reverses every inequality. Close fractions sum to exactly 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPlan {
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_loss: Decimal,
    /// Stop distance as a fraction of entry (the selected stop percent).
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_loss_pct: Decimal,
    pub take_profits: [TpLevel; 3],
    /// Position size in base currency.
    #[serde(with = "rust_decimal::serde::str")]
    pub size_base: Decimal,
    /// Position value in quote currency.
    #[serde(with = "rust_decimal::serde::str")]
    pub size_quote: Decimal,
    /// Margin actually locked given the leverage.
    #[serde(with = "rust_decimal::serde::str")]
    pub margin: Decimal,
    pub leverage: u32,
    /// Quote amount at risk between entry and stop.
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_amount: Decimal,
    /// Risk percent after the position cap (equals the configured percent
    /// unless the cap bound the size).
    #[serde(with = "rust_decimal::serde::str")]
    pub effective_risk_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_loss: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub expected_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_reward_ratio: Decimal,
}
