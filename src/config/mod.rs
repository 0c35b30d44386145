pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Load configuration, apply environment overrides, and validate.
///
/// A missing file yields the built-in defaults — the pipeline is fully
/// usable with zero configuration. A present-but-malformed file is an error.
///
/// # Environment variable overrides
///
/// | Env var                 | Config field                   |
/// |-------------------------|--------------------------------|
/// | `PILOT_SYMBOL`          | `app.default_symbol`           |
/// | `PILOT_LEVERAGE`        | `risk.leverage`                |
/// | `PILOT_RISK_PERCENT`    | `risk.risk_percent`            |
/// | `PILOT_ETH_GAS_GATE`    | `gates.eth_gas_gate_gwei`      |
/// | `PILOT_BTC_FEE_GATE`    | `gates.btc_fee_gate_sat_vb`    |
/// | `PILOT_MIN_BALANCE`     | `gates.min_balance`            |
/// | `PILOT_OUTPUT_DIR`      | `app.output_dir`               |
pub fn load_config(path: Option<&Path>) -> Result<PilotConfig> {
    let mut config = match path {
        Some(p) if p.exists() => {
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config file: {}", p.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", p.display()))?
        }
        Some(p) => {
            anyhow::bail!("config file not found: {}", p.display());
        }
        None => PilotConfig::default(),
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

/// Apply environment variable overrides. Only non-empty vars take effect;
/// parse failures keep the configured value and are logged.
fn apply_env_overrides(config: &mut PilotConfig) {
    if let Some(val) = env_nonempty("PILOT_SYMBOL") {
        info!(symbol = %val, "env override: PILOT_SYMBOL");
        config.app.default_symbol = val;
    }

    if let Some(val) = env_parse::<u32>("PILOT_LEVERAGE") {
        info!(val, "env override: PILOT_LEVERAGE");
        config.risk.leverage = val;
    }

    if let Some(val) = env_parse::<rust_decimal::Decimal>("PILOT_RISK_PERCENT") {
        info!(%val, "env override: PILOT_RISK_PERCENT");
        config.risk.risk_percent = val;
    }

    if let Some(val) = env_parse::<f64>("PILOT_ETH_GAS_GATE") {
        info!(val, "env override: PILOT_ETH_GAS_GATE");
        config.gates.eth_gas_gate_gwei = val;
    }

    if let Some(val) = env_parse::<f64>("PILOT_BTC_FEE_GATE") {
        info!(val, "env override: PILOT_BTC_FEE_GATE");
        config.gates.btc_fee_gate_sat_vb = val;
    }

    if let Some(val) = env_parse::<rust_decimal::Decimal>("PILOT_MIN_BALANCE") {
        info!(%val, "env override: PILOT_MIN_BALANCE");
        config.gates.min_balance = val;
    }

    if let Some(val) = env_nonempty("PILOT_OUTPUT_DIR") {
        info!(dir = %val, "env override: PILOT_OUTPUT_DIR");
        config.app.output_dir = val;
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PilotConfig::default();
        assert!(validate::validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/pilot.json"))).is_err());
    }

    #[test]
    fn test_partial_json_overlays_defaults() {
        let json = r#"{"thresholds": {"buy_score": 65.0}}"#;
        let config: PilotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.thresholds.buy_score, 65.0);
        // Untouched sections keep their defaults.
        assert_eq!(config.thresholds.sell_score, 25.0);
        assert_eq!(config.weights.news, 0.30);
    }
}
