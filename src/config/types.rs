use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::constants;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

/// Complete pipeline configuration. Every recognised option is an explicit
/// field — nothing is read out of untyped property bags at runtime.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub app: AppConfig,
    pub gates: GateConfig,
    pub weights: WeightConfig,
    pub thresholds: ThresholdConfig,
    pub risk: RiskConfig,
    pub features: FeatureConfig,
    pub adapters: AdapterConfig,
    pub dynamic_weights: DynamicWeightConfig,
    pub ai_layer: AiLayerConfig,
    pub backtest: BacktestConfig,
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default symbol for /api/decision and single mode.
    pub default_symbol: String,
    pub logging: LoggingConfig,
    /// Directory for analysis snapshots / backtest artefacts.
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_symbol: "BTCUSDT".into(),
            logging: LoggingConfig::default(),
            output_dir: "data".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, a JSON daily-rolling log file is written here.
    pub log_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Safety gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Offline callers (backtest without full-system data) switch the gate
    /// off; every live path leaves it on.
    pub enabled: bool,
    pub eth_gas_gate_gwei: f64,
    pub btc_fee_gate_sat_vb: f64,
    pub min_news_count: f64,
    pub fear_greed_floor: f64,
    pub fear_greed_ceil: f64,
    pub max_volatility: f64,
    pub max_open_positions: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_balance: Decimal,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            eth_gas_gate_gwei: constants::ETH_GAS_GATE_GWEI,
            btc_fee_gate_sat_vb: constants::BTC_FEE_GATE_SAT_VB,
            min_news_count: constants::MIN_NEWS_COUNT,
            fear_greed_floor: constants::FEAR_GREED_FLOOR,
            fear_greed_ceil: constants::FEAR_GREED_CEIL,
            max_volatility: constants::MAX_VOLATILITY,
            max_open_positions: constants::MAX_OPEN_POSITIONS,
            min_balance: constants::MIN_BALANCE_QUOTE.parse().expect("const decimal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring weights and thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub news: f64,
    pub price: f64,
    pub sentiment: f64,
    pub ai: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            news: constants::WEIGHT_NEWS,
            price: constants::WEIGHT_PRICE,
            sentiment: constants::WEIGHT_SENTIMENT,
            ai: constants::WEIGHT_AI,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub buy_score: f64,
    pub sell_score: f64,
    pub min_consistency: f64,
    pub long_fear_greed_ceil: f64,
    pub short_fear_greed_floor: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            buy_score: constants::BUY_SCORE_THRESHOLD,
            sell_score: constants::SELL_SCORE_THRESHOLD,
            min_consistency: constants::MIN_CONSISTENCY,
            long_fear_greed_ceil: constants::LONG_FEAR_GREED_CEIL,
            short_fear_greed_floor: constants::SHORT_FEAR_GREED_FLOOR,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk / position sizing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of balance risked per trade, 0 < r < 1.
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_percent: Decimal,
    pub leverage: u32,
    /// Position value cap: balance * max_position_fraction * leverage.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_position_fraction: Decimal,
    /// Optional user-supplied stop percent; volatility-banded when absent.
    #[serde(default, with = "decimal_opt_str")]
    pub stop_loss_pct: Option<Decimal>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percent: constants::DEFAULT_RISK_PERCENT.parse().expect("const decimal"),
            leverage: constants::DEFAULT_LEVERAGE,
            max_position_fraction: constants::MAX_POSITION_FRACTION
                .parse()
                .expect("const decimal"),
            stop_loss_pct: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Feature integration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Bars used for window statistics (change, volatility, high/low).
    pub candle_window: usize,
    pub trend_ma_short: usize,
    pub trend_ma_long: usize,
    /// Short/long MA gap must exceed this fraction of price to be a trend.
    pub trend_epsilon_fraction: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            candle_window: constants::CANDLE_WINDOW,
            trend_ma_short: constants::TREND_MA_SHORT,
            trend_ma_long: constants::TREND_MA_LONG,
            trend_epsilon_fraction: constants::TREND_EPSILON_FRACTION,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Per-family deadline in seconds; families absent from the map use
    /// `default_deadline_secs`.
    pub deadline_secs: HashMap<String, u64>,
    pub default_deadline_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    /// Whole-request deadline for one decision.
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    /// Candle interval token requested from the exchange.
    pub candle_interval: String,
    /// Number of candles requested.
    pub candle_limit: u32,
    /// Order book depth levels.
    pub order_book_depth: u32,
    /// Keyword set for the news filter; the built-in list is used when empty.
    pub news_keywords: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            deadline_secs: HashMap::new(),
            default_deadline_secs: constants::ADAPTER_DEADLINE_SECS,
            retries: constants::ADAPTER_RETRIES,
            backoff_base_ms: constants::ADAPTER_BACKOFF_BASE_MS,
            request_timeout_secs: constants::REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: constants::CACHE_TTL_SECS,
            candle_interval: "1h".into(),
            candle_limit: 100,
            order_book_depth: 20,
            news_keywords: Vec::new(),
        }
    }
}

impl AdapterConfig {
    pub fn deadline_for(&self, family: &str) -> std::time::Duration {
        let secs = self
            .deadline_secs
            .get(family)
            .copied()
            .unwrap_or(self.default_deadline_secs);
        std::time::Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// Dynamic weights
// ---------------------------------------------------------------------------

/// Regime -> category -> multiplier. Categories absent from a regime map
/// default to 1.0.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamicWeightConfig {
    pub enabled: bool,
    /// Price-change threshold (percent) for bull/bear classification.
    pub regime_change_pct: f64,
    pub multipliers: HashMap<String, HashMap<String, f64>>,
    /// |orderbook imbalance| above this is treated as suspected spoofing.
    pub spoof_imbalance_threshold: f64,
    pub spoof_orderbook_mult: f64,
    /// VIX above this boosts risk/macro categories.
    pub vix_stress_threshold: f64,
    pub vix_risk_mult: f64,
    pub vix_macro_mult: f64,
}

impl Default for DynamicWeightConfig {
    fn default() -> Self {
        let mut multipliers = HashMap::new();
        multipliers.insert(
            "bull".to_string(),
            HashMap::from([
                ("sentiment".to_string(), 1.3),
                ("news".to_string(), 1.2),
                ("orderbook".to_string(), 1.2),
                ("macro".to_string(), 0.8),
                ("ai".to_string(), 1.3),
                ("futures".to_string(), 1.0),
                ("risk".to_string(), 1.0),
            ]),
        );
        multipliers.insert(
            "bear".to_string(),
            HashMap::from([
                ("macro".to_string(), 1.4),
                ("risk".to_string(), 1.3),
                ("futures".to_string(), 1.2),
                ("sentiment".to_string(), 0.7),
                ("news".to_string(), 1.0),
                ("ai".to_string(), 1.0),
            ]),
        );
        multipliers.insert(
            "sideways".to_string(),
            HashMap::from([
                ("technical".to_string(), 1.3),
                ("orderbook".to_string(), 1.2),
            ]),
        );

        Self {
            enabled: true,
            regime_change_pct: 2.0,
            multipliers,
            spoof_imbalance_threshold: 0.8,
            spoof_orderbook_mult: 0.7,
            vix_stress_threshold: 30.0,
            vix_risk_mult: 1.3,
            vix_macro_mult: 1.2,
        }
    }
}

// ---------------------------------------------------------------------------
// AI decision layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiLayerConfig {
    pub enabled: bool,
    /// When true the AI suggestion may replace the engine decision. The
    /// documented contract keeps the layer advisory, so this defaults off.
    pub ai_override: bool,
    /// Minimum confidence for a sub-strategy signal to count.
    pub min_signal_confidence: f64,
}

impl Default for AiLayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ai_override: false,
            min_signal_confidence: 70.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub window_bars: usize,
    pub max_hold_bars: usize,
    /// Offline thresholds: the candle-only vector cannot reach the strict
    /// live thresholds (news/sentiment/ai families score neutral 50), so the
    /// replay profile lowers them. `full_system` runs restore the live set.
    pub buy_score: f64,
    pub sell_score: f64,
    pub min_consistency: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            window_bars: constants::BACKTEST_WINDOW_BARS,
            max_hold_bars: constants::BACKTEST_MAX_HOLD_BARS,
            buy_score: 55.0,
            sell_score: 48.0,
            min_consistency: 0.80,
        }
    }
}

// ---------------------------------------------------------------------------
// Server / monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_minutes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// `Option<Decimal>` as an optional string field.
mod decimal_opt_str {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}
