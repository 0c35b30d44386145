//! CLI entry — all operating modes are subcommands of this one binary.
//!
//! Exit codes: 0 success, 1 invalid arguments, 2 runtime failure, 130 on
//! Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use perp_pilot::config::{self, PilotConfig};
use perp_pilot::core::backtest::{BacktestParams, Backtester};
use perp_pilot::core::pipeline::Analyzer;
use perp_pilot::errors::PilotError;
use perp_pilot::export;
use perp_pilot::logging;
use perp_pilot::server::{self, AppState};
use perp_pilot::sources::SourceSet;
use perp_pilot::types::AccountState;

const EXIT_INVALID_ARGS: i32 = 1;
const EXIT_RUNTIME: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "perp-pilot")]
#[command(about = "Multi-source decision pipeline for crypto perpetual futures", long_about = None)]
struct Cli {
    /// Optional JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot analysis for a symbol.
    Single {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        /// Account balance in quote currency.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
        /// Risk per trade as a fraction (0 < r < 1).
        #[arg(long)]
        risk: Option<f64>,
        #[arg(long)]
        leverage: Option<u32>,
        /// Stop-loss fraction; volatility-banded when omitted.
        #[arg(long)]
        stop_loss: Option<f64>,
        /// Write a JSON snapshot of the analysis.
        #[arg(long)]
        snapshot: bool,
    },
    /// Repeat the one-shot analysis every N minutes.
    Monitor {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
        /// Minutes between iterations.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Serve the HTTP API.
    Api {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
    },
    /// Replay the pipeline over historical candles.
    Backtest {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        /// Days of history (1..30).
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Candle interval token (e.g. 1h, 15m).
        #[arg(long, default_value = "1h")]
        interval: String,
        #[arg(long, default_value_t = 1_000.0)]
        balance: f64,
        #[arg(long)]
        risk: Option<f64>,
        #[arg(long)]
        leverage: Option<u32>,
        #[arg(long)]
        stop_loss: Option<f64>,
        #[arg(long)]
        max_hold_bars: Option<usize>,
        /// Replay with the live gate and thresholds instead of the offline
        /// candle-only profile.
        #[arg(long)]
        full_system: bool,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help/version are success paths; everything else is arg misuse.
            let code = if e.use_stderr() { EXIT_INVALID_ARGS } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime should build");
    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<PilotError>()
                .is_some_and(|p| matches!(p, PilotError::InvalidInput { .. }))
            {
                eprintln!("invalid input: {e:#}");
                EXIT_INVALID_ARGS
            } else {
                eprintln!("runtime failure: {e:#}");
                EXIT_RUNTIME
            }
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let _ = dotenvy::dotenv();

    let mut config = config::load_config(cli.config.as_deref())?;
    let _guard = logging::init_tracing(&config.app.logging)?;

    match cli.command {
        Commands::Single {
            symbol,
            balance,
            risk,
            leverage,
            stop_loss,
            snapshot,
        } => {
            apply_risk_overrides(&mut config, risk, leverage, stop_loss)?;
            run_single(config, &symbol, balance, snapshot).await
        }
        Commands::Monitor {
            symbol,
            balance,
            interval,
        } => {
            if let Some(minutes) = interval {
                config.monitor.interval_minutes = minutes;
            }
            run_monitor(config, &symbol, balance).await
        }
        Commands::Api {
            port,
            host,
            balance,
        } => {
            if let Some(p) = port {
                config.server.port = p;
            }
            if let Some(h) = host {
                config.server.host = h;
            }
            run_api(config, balance).await
        }
        Commands::Backtest {
            symbol,
            days,
            interval,
            balance,
            risk,
            leverage,
            stop_loss,
            max_hold_bars,
            full_system,
        } => {
            apply_risk_overrides(&mut config, risk, leverage, stop_loss)?;
            run_backtest(
                config,
                &symbol,
                days,
                &interval,
                balance,
                max_hold_bars,
                full_system,
            )
            .await
        }
    }
}

fn apply_risk_overrides(
    config: &mut PilotConfig,
    risk: Option<f64>,
    leverage: Option<u32>,
    stop_loss: Option<f64>,
) -> Result<()> {
    if let Some(r) = risk {
        config.risk.risk_percent =
            Decimal::try_from(r).map_err(|_| PilotError::invalid("risk not a number"))?;
    }
    if let Some(l) = leverage {
        config.risk.leverage = l;
    }
    if let Some(s) = stop_loss {
        config.risk.stop_loss_pct =
            Some(Decimal::try_from(s).map_err(|_| PilotError::invalid("stop_loss not a number"))?);
    }
    config::validate::validate_config(config)?;
    Ok(())
}

fn account_from(balance: f64) -> Result<AccountState> {
    let balance = Decimal::try_from(balance)
        .ok()
        .filter(|b| *b > Decimal::ZERO)
        .ok_or_else(|| PilotError::invalid(format!("balance must be positive, got {balance}")))?;
    Ok(AccountState {
        balance,
        open_positions: 0,
    })
}

/// Token that fires on Ctrl+C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            trigger.cancel();
        }
    });
    token
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn run_single(config: PilotConfig, symbol: &str, balance: f64, snapshot: bool) -> Result<i32> {
    let account = account_from(balance)?;
    let output_dir = PathBuf::from(&config.app.output_dir);
    let analyzer = Analyzer::new(config.clone(), SourceSet::production(config.adapters.clone()));

    let cancel = interrupt_token();
    let report = match analyzer.analyze(symbol, &account, &cancel).await {
        Ok(report) => report,
        Err(_) if cancel.is_cancelled() => return Ok(EXIT_INTERRUPTED),
        Err(e) => return Err(e.into()),
    };

    println!("{}", server::format_summary(symbol, &report.to_data()));

    if snapshot {
        let path = export::write_analysis_snapshot(&output_dir, &report)?;
        info!(path = %path.display(), "analysis snapshot written");
    }

    Ok(0)
}

async fn run_monitor(config: PilotConfig, symbol: &str, balance: f64) -> Result<i32> {
    let account = account_from(balance)?;
    let output_dir = PathBuf::from(&config.app.output_dir);
    let interval =
        std::time::Duration::from_secs(config.monitor.interval_minutes.max(1) * 60);
    let analyzer = Analyzer::new(config.clone(), SourceSet::production(config.adapters.clone()));

    let cancel = interrupt_token();
    info!(symbol, interval_min = config.monitor.interval_minutes, "monitor started");

    loop {
        match analyzer.analyze(symbol, &account, &cancel).await {
            Ok(report) => {
                println!("{}", server::format_summary(symbol, &report.to_data()));
                if let Err(e) = export::append_trade_log(&output_dir, &report) {
                    warn!(error = %e, "failed to append monitor log");
                }
            }
            Err(_) if cancel.is_cancelled() => return Ok(EXIT_INTERRUPTED),
            Err(e) => warn!(error = %e, "analysis iteration failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(EXIT_INTERRUPTED),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn run_api(config: PilotConfig, balance: f64) -> Result<i32> {
    let account = account_from(balance)?;
    let cancel = interrupt_token();

    let analyzer = Analyzer::new(config.clone(), SourceSet::production(config.adapters.clone()));
    let state = Arc::new(AppState::new(
        analyzer,
        account,
        config.app.default_symbol.clone(),
        cancel.clone(),
    ));

    server::serve(state, &config.server.host, config.server.port).await?;

    Ok(if cancel.is_cancelled() { EXIT_INTERRUPTED } else { 0 })
}

async fn run_backtest(
    config: PilotConfig,
    symbol: &str,
    days: u32,
    interval: &str,
    balance: f64,
    max_hold_bars: Option<usize>,
    full_system: bool,
) -> Result<i32> {
    if !(1..=30).contains(&days) {
        return Err(PilotError::invalid(format!("days must be 1..30, got {days}")).into());
    }

    let bars_per_day = match interval {
        "1m" => 1440,
        "5m" => 288,
        "15m" => 96,
        "1h" => 24,
        "4h" => 6,
        "1d" => 1,
        other => {
            return Err(PilotError::invalid(format!("unrecognised interval {other:?}")).into());
        }
    };
    let limit = (bars_per_day * days).min(1000);

    let mut params = BacktestParams::from_config(symbol, &config);
    params.initial_balance = account_from(balance)?.balance;
    params.full_system = full_system;
    if let Some(bars) = max_hold_bars {
        params.max_hold_bars = bars;
    }

    // Fetch history through the same candle adapter the live pipeline uses.
    let mut adapters = config.adapters.clone();
    adapters.candle_interval = interval.to_string();
    adapters.candle_limit = limit;
    let sources = SourceSet::production(adapters);

    let candles = sources
        .candles
        .as_ref()
        .expect("production set has candles")
        .fetch(symbol, chrono::Utc::now().timestamp_millis())
        .await
        .context("failed to fetch historical candles")?;

    info!(candles = candles.len(), symbol, interval, "history fetched");

    let output_dir = PathBuf::from(&config.app.output_dir);
    let backtester = Backtester::new(config, params);
    let report = backtester.run(&candles)?;

    println!("{}", export::format_stats(symbol, &report));
    let (trades_path, stats_path) =
        export::write_backtest_artifacts(&output_dir, symbol, &report)?;
    info!(
        trades = %trades_path.display(),
        stats = %stats_path.display(),
        "backtest artefacts written"
    );

    Ok(0)
}
