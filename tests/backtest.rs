//! Backtest smoke scenario: a persistent uptrend must produce at least one
//! profitable LONG under the replay profile, and the artefact writer must
//! produce the CSV/stats pair.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use perp_pilot::config::PilotConfig;
use perp_pilot::core::backtest::{BacktestParams, Backtester};
use perp_pilot::export;
use perp_pilot::types::{Candle, ExitReason, Side};

fn uptrend_hourly(bars: usize) -> Vec<Candle> {
    (0..bars)
        .map(|i| {
            let base = 100.0 * 1.003f64.powi(i as i32);
            let d = |v: f64| Decimal::try_from(v).unwrap();
            Candle {
                open_ts: i as i64 * 3_600_000,
                open: d(base),
                high: d(base * 1.004),
                low: d(base * 0.998),
                close: d(base * 1.002),
                volume: d(100.0),
            }
        })
        .collect()
}

fn params() -> BacktestParams {
    BacktestParams {
        symbol: "BTCUSDT".into(),
        initial_balance: dec!(1_000),
        risk_percent: dec!(0.02),
        leverage: 10,
        stop_loss_pct: Some(dec!(0.02)),
        max_hold_bars: 12,
        window_bars: 24,
        full_system: false,
    }
}

#[test]
fn uptrend_smoke() {
    let candles = uptrend_hourly(168);
    let backtester = Backtester::new(PilotConfig::default(), params());
    let report = backtester.run(&candles).unwrap();

    assert!(
        report.trades.iter().any(|t| t.side == Side::Long),
        "expected at least one LONG, got {:?}",
        report.stats
    );

    let total_pnl: Decimal = report.trades.iter().map(|t| t.pnl_quote).sum();
    assert!(total_pnl > Decimal::ZERO, "uptrend PnL should be positive");
    assert_eq!(
        report.stats.final_balance,
        report.stats.initial_balance + total_pnl
    );

    // No trade violates the plan geometry.
    for trade in &report.trades {
        match (trade.side, trade.exit_reason) {
            (Side::Long, ExitReason::Sl) => assert!(trade.exit < trade.entry),
            (Side::Long, ExitReason::Tp1 | ExitReason::Tp2 | ExitReason::Tp3) => {
                assert!(trade.exit > trade.entry)
            }
            (Side::Short, ExitReason::Sl) => assert!(trade.exit > trade.entry),
            (Side::Short, ExitReason::Tp1 | ExitReason::Tp2 | ExitReason::Tp3) => {
                assert!(trade.exit < trade.entry)
            }
            _ => {}
        }
        assert!(trade.close_ts >= trade.open_ts);
    }
}

#[test]
fn shuffled_history_is_refused() {
    let mut candles = uptrend_hourly(60);
    candles.swap(10, 40);
    let backtester = Backtester::new(PilotConfig::default(), params());
    assert!(backtester.run(&candles).is_err());
}

#[test]
fn artefacts_written_for_a_run() {
    let candles = uptrend_hourly(120);
    let backtester = Backtester::new(PilotConfig::default(), params());
    let report = backtester.run(&candles).unwrap();

    let dir = std::env::temp_dir().join(format!("pilot-bt-{}", std::process::id()));
    let (trades_path, stats_path) =
        export::write_backtest_artifacts(&dir, "BTCUSDT", &report).unwrap();

    let csv = std::fs::read_to_string(&trades_path).unwrap();
    // Header plus one line per trade.
    assert_eq!(csv.lines().count(), report.trades.len() + 1);

    let stats_text = std::fs::read_to_string(&stats_path).unwrap();
    assert!(stats_text.contains("Win rate"));
    assert!(stats_text.contains("Sharpe proxy"));

    let _ = std::fs::remove_dir_all(&dir);
}
