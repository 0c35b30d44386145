//! Pipeline-wide defaults. Every value here is a fallback for a config field;
//! nothing reads these directly except `config::types` Default impls.

/// ETH gas gate in Gwei: at or below this the ETH leg is tradeable.
pub const ETH_GAS_GATE_GWEI: f64 = 30.0;

/// BTC fee gate in sat/vB: at or below this the BTC leg is tradeable.
pub const BTC_FEE_GATE_SAT_VB: f64 = 15.0;

/// Neutral gas defaults when the adapter is absent (deliberately above the
/// gates so a missing source keeps the cost gate closed).
pub const NEUTRAL_ETH_GAS_GWEI: f64 = 50.0;
pub const NEUTRAL_BTC_FEE_SAT_VB: f64 = 20.0;

/// Minimum accepted news items for the data-completeness gate.
pub const MIN_NEWS_COUNT: f64 = 8.0;

/// Fear & greed band accepted by the market-state gate.
pub const FEAR_GREED_FLOOR: f64 = 25.0;
pub const FEAR_GREED_CEIL: f64 = 75.0;

/// Volatility cap for the safety gate (population stddev / mean of closes).
pub const MAX_VOLATILITY: f64 = 0.04;

/// Account-state gate defaults.
pub const MAX_OPEN_POSITIONS: usize = 3;
pub const MIN_BALANCE_QUOTE: &str = "100";

/// Conservative decision thresholds.
pub const BUY_SCORE_THRESHOLD: f64 = 75.0;
pub const SELL_SCORE_THRESHOLD: f64 = 25.0;
pub const MIN_CONSISTENCY: f64 = 0.80;
pub const LONG_FEAR_GREED_CEIL: f64 = 70.0;
pub const SHORT_FEAR_GREED_FLOOR: f64 = 30.0;

/// Base category weights (must sum to 1.0).
pub const WEIGHT_NEWS: f64 = 0.30;
pub const WEIGHT_PRICE: f64 = 0.25;
pub const WEIGHT_SENTIMENT: f64 = 0.25;
pub const WEIGHT_AI: f64 = 0.20;

/// Position sizing defaults.
pub const DEFAULT_RISK_PERCENT: &str = "0.015";
pub const DEFAULT_LEVERAGE: u32 = 10;
pub const MAX_POSITION_FRACTION: &str = "0.15";

/// Take-profit tiers: distance multiplier on the stop distance, and the
/// fraction of the position closed at each tier. The tier structure fixes
/// the risk-reward ratio at 0.5*1.5 + 0.3*2.5 + 0.2*4.0 = 2.3.
pub const TP_DISTANCE_MULTS: [&str; 3] = ["1.5", "2.5", "4.0"];
pub const TP_CLOSE_FRACTIONS: [&str; 3] = ["0.5", "0.3", "0.2"];

/// Trend epsilon: short/long moving-average gap must exceed this fraction of
/// price to count as a trend.
pub const TREND_EPSILON_FRACTION: f64 = 0.001;

/// Moving-average windows for the trend feature.
pub const TREND_MA_SHORT: usize = 7;
pub const TREND_MA_LONG: usize = 20;

/// Candle window used for window statistics (change, volatility, high/low).
pub const CANDLE_WINDOW: usize = 24;

/// Adapter scheduling.
pub const ADAPTER_DEADLINE_SECS: u64 = 10;
pub const ADAPTER_RETRIES: u32 = 3;
pub const ADAPTER_BACKOFF_BASE_MS: u64 = 250;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// TTL for the per-(symbol, family) response cache, in minute buckets.
pub const CACHE_TTL_SECS: u64 = 60;

/// Backtest defaults.
pub const BACKTEST_WINDOW_BARS: usize = 24;
pub const BACKTEST_MAX_HOLD_BARS: usize = 12;
