//! Persisted artefacts: backtest trade CSVs, backtest stats text files,
//! per-request analysis snapshots, and the monitor's append-only trade log.
//! Layouts are stable across runs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::backtest::BacktestReport;
use crate::core::pipeline::AnalysisReport;
use crate::types::Trade;

/// CSV row for one trade — field names match the trade entity keys.
#[derive(Serialize)]
struct TradeRow<'a> {
    open_ts: i64,
    close_ts: i64,
    side: &'a str,
    entry: String,
    exit: String,
    exit_reason: &'a str,
    pnl_quote: String,
    pnl_pct: f64,
}

impl<'a> From<&'a Trade> for TradeRow<'a> {
    fn from(t: &'a Trade) -> Self {
        Self {
            open_ts: t.open_ts,
            close_ts: t.close_ts,
            side: t.side.as_str(),
            entry: t.entry.to_string(),
            exit: t.exit.to_string(),
            exit_reason: t.exit_reason.as_str(),
            pnl_quote: t.pnl_quote.to_string(),
            pnl_pct: t.pnl_pct,
        }
    }
}

/// Write `<symbol>_trades_<stamp>.csv` and `<symbol>_stats_<stamp>.txt` into
/// `dir/backtest/`. Returns the two paths.
pub fn write_backtest_artifacts(
    dir: &Path,
    symbol: &str,
    report: &BacktestReport,
) -> Result<(PathBuf, PathBuf)> {
    let out_dir = dir.join("backtest");
    std::fs::create_dir_all(&out_dir).context("create backtest output dir")?;

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    let trades_path = out_dir.join(format!("{symbol}_trades_{stamp}.csv"));
    let mut writer = csv::Writer::from_path(&trades_path)
        .with_context(|| format!("open {}", trades_path.display()))?;
    for trade in &report.trades {
        writer.serialize(TradeRow::from(trade))?;
    }
    writer.flush()?;

    let stats_path = out_dir.join(format!("{symbol}_stats_{stamp}.txt"));
    std::fs::write(&stats_path, format_stats(symbol, report))
        .with_context(|| format!("write {}", stats_path.display()))?;

    Ok((trades_path, stats_path))
}

/// Human-readable stats summary, mirrored by the CLI output.
pub fn format_stats(symbol: &str, report: &BacktestReport) -> String {
    let s = &report.stats;
    let mut out = String::new();
    out.push_str(&"=".repeat(70));
    out.push_str(&format!("\nBacktest report — {symbol}\n"));
    out.push_str(&"=".repeat(70));
    out.push_str(&format!(
        "\n\nInitial balance:  {}\nFinal balance:    {}\nTotal return:     {:+.2}%\n",
        s.initial_balance, s.final_balance, s.return_pct
    ));
    out.push_str(&format!(
        "\nTrades:           {}\nWinners:          {}\nLosers:           {}\nWin rate:         {:.2}%\n",
        s.total_trades, s.winning_trades, s.losing_trades, s.win_rate_pct
    ));
    out.push_str(&format!(
        "\nAverage win:      {}\nAverage loss:     {}\nMax drawdown:     {:.2}%\nProfit factor:    {:.2}\nSharpe proxy:     {:.2}\n",
        s.avg_win, s.avg_loss, s.max_drawdown_pct, s.profit_factor, s.sharpe_proxy
    ));
    out
}

/// Write one analysis snapshot as JSON: `{decision, signals, position,
/// features sidecar}` under `dir/analysis/`.
pub fn write_analysis_snapshot(dir: &Path, report: &AnalysisReport) -> Result<PathBuf> {
    let out_dir = dir.join("analysis");
    std::fs::create_dir_all(&out_dir).context("create analysis output dir")?;

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = out_dir.join(format!("{}_{stamp}.json", report.symbol));

    let snapshot = serde_json::json!({
        "data": report.to_data(),
        "features": report.features,
        "metadata": report.metadata,
        "request_id": report.request_id,
    });

    std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
        .with_context(|| format!("write {}", path.display()))?;

    Ok(path)
}

/// Append one JSON line per monitor iteration — the loop's only state.
pub fn append_trade_log(dir: &Path, report: &AnalysisReport) -> Result<()> {
    std::fs::create_dir_all(dir).context("create output dir")?;
    let path = dir.join("monitor_log.jsonl");

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    let line = serde_json::json!({
        "timestamp": report.timestamp,
        "symbol": report.symbol,
        "action": report.decision.action.as_str(),
        "confidence": report.decision.confidence,
        "total_score": report.decision.scores.total_score,
        "request_id": report.request_id,
    });
    writeln!(file, "{line}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backtest::BacktestReport;
    use crate::types::{BacktestStats, ExitReason, Side, Trade};
    use rust_decimal_macros::dec;

    fn report() -> BacktestReport {
        BacktestReport {
            trades: vec![Trade {
                open_ts: 1,
                close_ts: 2,
                side: Side::Long,
                entry: dec!(100),
                exit: dec!(103),
                exit_reason: ExitReason::Tp1,
                pnl_quote: dec!(15),
                pnl_pct: 1.5,
            }],
            stats: BacktestStats {
                initial_balance: dec!(1_000),
                final_balance: dec!(1_015),
                return_pct: 1.5,
                total_trades: 1,
                winning_trades: 1,
                losing_trades: 0,
                win_rate_pct: 100.0,
                avg_win: dec!(15),
                avg_loss: dec!(0),
                max_drawdown_pct: 0.0,
                profit_factor: f64::INFINITY,
                sharpe_proxy: 0.0,
            },
        }
    }

    #[test]
    fn test_backtest_artifacts_written() {
        let dir = std::env::temp_dir().join(format!("pilot-export-{}", std::process::id()));
        let (trades_path, stats_path) =
            write_backtest_artifacts(&dir, "BTCUSDT", &report()).unwrap();

        let csv = std::fs::read_to_string(&trades_path).unwrap();
        assert!(csv.lines().next().unwrap().contains("exit_reason"));
        assert!(csv.contains("TP1"));

        let stats = std::fs::read_to_string(&stats_path).unwrap();
        assert!(stats.contains("Win rate"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_format_stats_mentions_balances() {
        let text = format_stats("BTCUSDT", &report());
        assert!(text.contains("1015"));
        assert!(text.contains("BTCUSDT"));
    }
}
