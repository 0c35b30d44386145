use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::plan::Side;

/// Why the last portion of a simulated position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    /// Stop loss filled (assumed first on SL/TP ties within a bar).
    Sl,
    Tp1,
    Tp2,
    Tp3,
    /// Max hold bars elapsed; remainder closed at the bar close.
    Timeout,
    /// Series ended with the position still open.
    End,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sl => "SL",
            Self::Tp1 => "TP1",
            Self::Tp2 => "TP2",
            Self::Tp3 => "TP3",
            Self::Timeout => "TIMEOUT",
            Self::End => "END",
        }
    }
}

/// One completed simulated trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub open_ts: i64,
    pub close_ts: i64,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry: Decimal,
    /// Price at which the final portion closed.
    #[serde(with = "rust_decimal::serde::str")]
    pub exit: Decimal,
    pub exit_reason: ExitReason,
    #[serde(with = "rust_decimal::serde::str")]
    pub pnl_quote: Decimal,
    /// PnL relative to position value at entry, percent.
    pub pnl_pct: f64,
}

/// Summary statistics over one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestStats {
    #[serde(with = "rust_decimal::serde::str")]
    pub initial_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub final_balance: Decimal,
    pub return_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: f64,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_win: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_loss: Decimal,
    pub max_drawdown_pct: f64,
    /// Gross wins / gross losses; infinite when there are no losses.
    pub profit_factor: f64,
    /// mean(per-trade return) / stddev(per-trade return) * sqrt(N).
    pub sharpe_proxy: f64,
}
