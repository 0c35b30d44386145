//! Backtester — replays the decision pipeline over historical candles.
//!
//! Per step the integrator builds a vector from the trailing window (candle
//! family only unless a full-system run supplies stored adapter snapshots)
//! and the same decision engine scores it under the offline threshold
//! profile. Fills are simulated against each bar's intra-bar range with the
//! conservative tie-break: when a stop and a take-profit share a bar, the
//! stop fires first; lower-numbered tiers fire before higher ones. Partial
//! closes keep the original stop for the remainder.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::PilotConfig;
use crate::errors::PilotError;
use crate::sources::candles::ensure_monotonic;
use crate::types::{
    AccountState, Action, BacktestStats, Candle, ExitReason, MarketSnapshot, PositionPlan, Side,
    Trade,
};

use super::engine::DecisionEngine;
use super::integrator;
use super::planner::PositionPlanner;
use super::weights::{DynamicWeightManager, DynamicWeights};

/// One backtest run's inputs.
#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub symbol: String,
    pub initial_balance: Decimal,
    pub risk_percent: Decimal,
    pub leverage: u32,
    pub stop_loss_pct: Option<Decimal>,
    pub max_hold_bars: usize,
    pub window_bars: usize,
    /// Replays the live gate and thresholds against supplied adapter
    /// history instead of the offline candle-only profile.
    pub full_system: bool,
}

impl BacktestParams {
    pub fn from_config(symbol: &str, config: &PilotConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            initial_balance: dec!(1_000),
            risk_percent: config.risk.risk_percent,
            leverage: config.risk.leverage,
            stop_loss_pct: config.risk.stop_loss_pct,
            max_hold_bars: config.backtest.max_hold_bars,
            window_bars: config.backtest.window_bars,
            full_system: false,
        }
    }
}

/// Trades plus the summary statistics.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub trades: Vec<Trade>,
    pub stats: BacktestStats,
}

struct OpenPosition {
    side: Side,
    plan: PositionPlan,
    entry_ts: i64,
    entry_index: usize,
    /// Fraction of the original size still open.
    remaining: Decimal,
    realized: Decimal,
    tp_hit: [bool; 3],
}

pub struct Backtester {
    params: BacktestParams,
    engine: DecisionEngine,
    planner: PositionPlanner,
    weight_manager: DynamicWeightManager,
    config: PilotConfig,
}

impl Backtester {
    /// The offline profile disables the safety gate (the candle-only vector
    /// has no news/ai/gas families to satisfy it) and swaps in the replay
    /// thresholds; a full-system run keeps the live configuration.
    pub fn new(mut config: PilotConfig, params: BacktestParams) -> Self {
        config.features.candle_window = params.window_bars;
        config.risk.risk_percent = params.risk_percent;
        config.risk.leverage = params.leverage;
        config.risk.stop_loss_pct = params.stop_loss_pct;

        if !params.full_system {
            config.gates.enabled = false;
            config.thresholds.buy_score = config.backtest.buy_score;
            config.thresholds.sell_score = config.backtest.sell_score;
            config.thresholds.min_consistency = config.backtest.min_consistency;
        }

        Self {
            engine: DecisionEngine::new(
                config.gates.clone(),
                config.weights.clone(),
                config.thresholds.clone(),
            ),
            planner: PositionPlanner::new(config.risk.clone()),
            weight_manager: DynamicWeightManager::new(config.dynamic_weights.clone()),
            params,
            config,
        }
    }

    /// Candle-only replay.
    pub fn run(&self, candles: &[Candle]) -> Result<BacktestReport, PilotError> {
        self.run_with_snapshots(candles, |window| MarketSnapshot {
            candles: Some(window.to_vec()),
            ..Default::default()
        })
    }

    /// Full replay: `snapshot_at` receives the trailing window ending at the
    /// decision bar and returns the complete market snapshot (stored news,
    /// sentiment, gas, ... for that moment).
    pub fn run_with_snapshots<F>(
        &self,
        candles: &[Candle],
        snapshot_at: F,
    ) -> Result<BacktestReport, PilotError>
    where
        F: Fn(&[Candle]) -> MarketSnapshot,
    {
        ensure_monotonic(candles)
            .map_err(|e| PilotError::invalid(format!("historical input rejected: {e}")))?;

        if candles.len() < self.params.window_bars + 2 {
            return Err(PilotError::invalid(format!(
                "need at least {} candles, got {}",
                self.params.window_bars + 2,
                candles.len()
            )));
        }

        let mut balance = self.params.initial_balance;
        let mut trades: Vec<Trade> = Vec::new();
        let mut open: Option<OpenPosition> = None;

        for i in self.params.window_bars..candles.len() {
            let bar = &candles[i];

            // Manage the open position first; a close frees the slot for a
            // fresh decision on a later bar, never the same one.
            if let Some(mut position) = open.take() {
                let held = i - position.entry_index;
                match self.step_position(&mut position, bar, held) {
                    Some((exit_price, reason)) => {
                        let trade = close_trade(&position, bar, exit_price, reason);
                        balance += trade.pnl_quote;
                        debug!(
                            reason = reason.as_str(),
                            pnl = %trade.pnl_quote,
                            balance = %balance,
                            "trade closed"
                        );
                        trades.push(trade);
                    }
                    None => open = Some(position),
                }
                continue;
            }

            // Decision bar: use everything up to and including bar i, enter
            // at the next bar's open.
            if i + 1 >= candles.len() || balance <= Decimal::ZERO {
                continue;
            }

            let window = &candles[..=i];
            let account = AccountState {
                balance,
                open_positions: 0,
            };

            let snapshot = snapshot_at(&window[window.len() - self.params.window_bars..]);
            let (features, _) = integrator::integrate(
                &snapshot,
                &self.params.symbol,
                bar.open_ts,
                &self.config.features,
                &self.config.gates,
            );

            let dynamic = if self.config.dynamic_weights.enabled {
                self.weight_manager.evaluate(&features)
            } else {
                DynamicWeights::unit()
            };

            let decision = self.engine.evaluate(&features, &account, &dynamic, None)?;
            let side = match decision.action {
                Action::Long => Side::Long,
                Action::Short => Side::Short,
                Action::Hold => continue,
            };

            let entry_bar = &candles[i + 1];
            let volatility = features.get(crate::types::FeatureName::Volatility);
            match self
                .planner
                .plan(side, entry_bar.open, volatility, balance)
            {
                Ok(plan) => {
                    debug!(
                        bar = i,
                        side = side.as_str(),
                        entry = %plan.entry_price,
                        "position opened"
                    );
                    open = Some(OpenPosition {
                        side,
                        plan,
                        entry_ts: entry_bar.open_ts,
                        entry_index: i + 1,
                        remaining: Decimal::ONE,
                        realized: Decimal::ZERO,
                        tp_hit: [false; 3],
                    });
                }
                Err(e) => debug!(bar = i, error = %e, "entry skipped, planner refused"),
            }
        }

        // Close anything still open on the last bar.
        if let Some(position) = open {
            let last = candles.last().expect("candles non-empty");
            let trade = close_trade(&position, last, last.close, ExitReason::End);
            balance += trade.pnl_quote;
            trades.push(trade);
        }

        let stats = statistics(self.params.initial_balance, balance, &trades);
        info!(
            trades = stats.total_trades,
            return_pct = stats.return_pct,
            win_rate = stats.win_rate_pct,
            "backtest finished"
        );

        Ok(BacktestReport { trades, stats })
    }

    /// Advance an open position through one bar. Returns the exit price and
    /// reason when the position fully closes.
    fn step_position(
        &self,
        position: &mut OpenPosition,
        bar: &Candle,
        bars_held: usize,
    ) -> Option<(Decimal, ExitReason)> {
        let plan = &position.plan;
        let entry = plan.entry_price;
        let size = plan.size_base;

        let stop_in_range = match position.side {
            Side::Long => bar.low <= plan.stop_loss,
            Side::Short => bar.high >= plan.stop_loss,
        };
        if stop_in_range {
            // Conservative tie-break: the stop fires before any take-profit
            // that shares the bar, for the full remaining size.
            let pnl = signed_pnl(position.side, entry, plan.stop_loss, size * position.remaining);
            position.realized += pnl;
            position.remaining = Decimal::ZERO;
            return Some((plan.stop_loss, ExitReason::Sl));
        }

        for (tier, tp) in plan.take_profits.iter().enumerate() {
            if position.tp_hit[tier] {
                continue;
            }
            let hit = match position.side {
                Side::Long => bar.high >= tp.price,
                Side::Short => bar.low <= tp.price,
            };
            if !hit {
                // Tiers are ordered outward; a missed tier means the rest
                // are out of range too.
                break;
            }

            position.tp_hit[tier] = true;
            let closed = size * tp.close_fraction;
            position.realized += signed_pnl(position.side, entry, tp.price, closed);
            position.remaining -= tp.close_fraction;

            if position.remaining <= Decimal::ZERO {
                let reason = match tier {
                    0 => ExitReason::Tp1,
                    1 => ExitReason::Tp2,
                    _ => ExitReason::Tp3,
                };
                return Some((tp.price, reason));
            }
        }

        if bars_held >= self.params.max_hold_bars {
            let pnl = signed_pnl(position.side, entry, bar.close, size * position.remaining);
            position.realized += pnl;
            position.remaining = Decimal::ZERO;
            return Some((bar.close, ExitReason::Timeout));
        }

        None
    }
}

fn signed_pnl(side: Side, entry: Decimal, exit: Decimal, size_base: Decimal) -> Decimal {
    match side {
        Side::Long => (exit - entry) * size_base,
        Side::Short => (entry - exit) * size_base,
    }
}

fn close_trade(
    position: &OpenPosition,
    bar: &Candle,
    exit_price: Decimal,
    reason: ExitReason,
) -> Trade {
    // Whatever is still open when we get here (END path) closes at the
    // given price; SL/TP/timeout paths have already realised everything.
    let residual = signed_pnl(
        position.side,
        position.plan.entry_price,
        exit_price,
        position.plan.size_base * position.remaining,
    );
    let pnl = position.realized + residual;

    let position_value = position.plan.entry_price * position.plan.size_base;
    let pnl_pct = if position_value > Decimal::ZERO {
        (pnl / position_value * dec!(100)).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };

    Trade {
        open_ts: position.entry_ts,
        close_ts: bar.open_ts,
        side: position.side,
        entry: position.plan.entry_price,
        exit: exit_price,
        exit_reason: reason,
        pnl_quote: pnl,
        pnl_pct,
    }
}

fn statistics(initial: Decimal, final_balance: Decimal, trades: &[Trade]) -> BacktestStats {
    let total = trades.len();
    let winners: Vec<&Trade> = trades.iter().filter(|t| t.pnl_quote > Decimal::ZERO).collect();
    let losers: Vec<&Trade> = trades.iter().filter(|t| t.pnl_quote <= Decimal::ZERO).collect();

    let sum = |v: &[&Trade]| v.iter().map(|t| t.pnl_quote).sum::<Decimal>();
    let gross_win = sum(&winners);
    let gross_loss = -sum(&losers);

    let avg = |total: Decimal, n: usize| {
        if n == 0 {
            Decimal::ZERO
        } else {
            total / Decimal::from(n as u64)
        }
    };

    // Equity curve after each trade for the drawdown.
    let mut equity = initial.to_f64().unwrap_or(0.0);
    let mut peak = equity;
    let mut max_drawdown_pct = 0.0f64;
    for trade in trades {
        equity += trade.pnl_quote.to_f64().unwrap_or(0.0);
        peak = peak.max(equity);
        if peak > 0.0 {
            max_drawdown_pct = max_drawdown_pct.max((peak - equity) / peak * 100.0);
        }
    }

    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    let sharpe_proxy = if returns.len() >= 2 {
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() as f64 - 1.0);
        let std = var.sqrt();
        if std > 0.0 {
            mean / std * (returns.len() as f64).sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    let profit_factor = if gross_loss > Decimal::ZERO {
        (gross_win / gross_loss).to_f64().unwrap_or(0.0)
    } else if gross_win > Decimal::ZERO {
        f64::INFINITY
    } else {
        0.0
    };

    let return_pct = if initial > Decimal::ZERO {
        ((final_balance - initial) / initial * dec!(100))
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    BacktestStats {
        initial_balance: initial,
        final_balance,
        return_pct,
        total_trades: total,
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        win_rate_pct: if total == 0 {
            0.0
        } else {
            winners.len() as f64 / total as f64 * 100.0
        },
        avg_win: avg(gross_win, winners.len()),
        avg_loss: avg(-gross_loss, losers.len()),
        max_drawdown_pct,
        profit_factor,
        sharpe_proxy,
    }
}
