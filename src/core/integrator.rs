//! Feature integrator — multi-source fusion into the fixed-layout vector.
//!
//! Pure CPU and infallible: whatever subset of adapter results is present is
//! folded in, and every absent family contributes its documented neutral
//! default. Values are clamped into their declared ranges; each clamp leaves
//! a warning in the metadata sidecar. Window statistics run in `f64`;
//! Decimal candle fields convert at the boundary.

use rust_decimal::prelude::ToPrimitive;

use crate::config::{FeatureConfig, GateConfig};
use crate::constants;
use crate::types::{
    AiPrediction, Candle, FeatureMetadata, FeatureName, FeatureVector, MarketSnapshot,
    SourceAvailability,
};
use crate::sources::{news, orderbook};

/// Build a feature vector and its metadata sidecar from whichever adapter
/// results arrived.
pub fn integrate(
    snapshot: &MarketSnapshot,
    symbol: &str,
    now: i64,
    features: &FeatureConfig,
    gates: &GateConfig,
) -> (FeatureVector, FeatureMetadata) {
    let mut vector = FeatureVector::zeroed();
    let mut warnings = Vec::new();
    let mut raw = serde_json::Map::new();

    let availability = SourceAvailability {
        candles: snapshot.candles.as_ref().is_some_and(|c| !c.is_empty()),
        order_book: snapshot.order_book.is_some(),
        gas: snapshot.gas.is_some(),
        news: snapshot.news.is_some(),
        sentiment: snapshot.sentiment.is_some(),
        macro_data: snapshot.macro_data.is_some(),
        futures: snapshot.futures.is_some(),
        prediction_market: snapshot.prediction_market.is_some(),
        ai: snapshot
            .ai_predictions
            .as_ref()
            .is_some_and(|p| !p.is_empty()),
    };

    let mut put = |vector: &mut FeatureVector, name: FeatureName, value: f64| {
        let (lo, hi) = name.range();
        let mut clamped = value;
        if let Some(lo) = lo {
            clamped = clamped.max(lo);
        }
        if let Some(hi) = hi {
            clamped = clamped.min(hi);
        }
        if !value.is_finite() {
            clamped = 0.0;
            warnings.push(format!("{}: non-finite value replaced with 0", name.as_str()));
        } else if clamped != value {
            warnings.push(format!(
                "{}: {value} clamped into declared range",
                name.as_str()
            ));
        }
        vector.set(name, clamped);
    };

    // -- Gas ---------------------------------------------------------------
    let (eth_gas, btc_fee) = match &snapshot.gas {
        Some(quote) => (
            quote.eth_gwei.unwrap_or(constants::NEUTRAL_ETH_GAS_GWEI),
            quote.btc_sat_vb.unwrap_or(constants::NEUTRAL_BTC_FEE_SAT_VB),
        ),
        None => (
            constants::NEUTRAL_ETH_GAS_GWEI,
            constants::NEUTRAL_BTC_FEE_SAT_VB,
        ),
    };
    put(&mut vector, FeatureName::EthGas, eth_gas);
    put(&mut vector, FeatureName::BtcFee, btc_fee);
    put(
        &mut vector,
        FeatureName::EthTradeable,
        if availability.gas && eth_gas <= gates.eth_gas_gate_gwei {
            1.0
        } else {
            0.0
        },
    );
    put(
        &mut vector,
        FeatureName::BtcTradeable,
        if availability.gas && btc_fee <= gates.btc_fee_gate_sat_vb {
            1.0
        } else {
            0.0
        },
    );
    if let Some(quote) = &snapshot.gas {
        if let Ok(v) = serde_json::to_value(quote) {
            raw.insert("gas".into(), v);
        }
    }

    // -- Candle window statistics ------------------------------------------
    if availability.candles {
        let candles = snapshot.candles.as_ref().expect("availability checked");
        let stats = window_stats(candles, features);

        put(&mut vector, FeatureName::CurrentPrice, stats.current_price);
        put(&mut vector, FeatureName::PriceChangePct, stats.change_pct);
        put(&mut vector, FeatureName::AvgVolume, stats.avg_volume);
        put(&mut vector, FeatureName::Volatility, stats.volatility);
        put(&mut vector, FeatureName::Trend, stats.trend);
        put(&mut vector, FeatureName::HighPrice, stats.high);
        put(&mut vector, FeatureName::LowPrice, stats.low);
        put(&mut vector, FeatureName::PriceRangePct, stats.range_pct);
    }

    // -- News --------------------------------------------------------------
    if let Some(items) = &snapshot.news {
        let digest = news::digest(items);
        put(&mut vector, FeatureName::NewsScore, digest.score);
        put(&mut vector, FeatureName::NewsPosRatio, digest.pos_ratio);
        put(&mut vector, FeatureName::NewsNegRatio, digest.neg_ratio);
        put(&mut vector, FeatureName::NewsCount, digest.count as f64);
        put(
            &mut vector,
            FeatureName::NewsSentimentLabel,
            digest.label as f64,
        );
    }

    // -- Market sentiment ---------------------------------------------------
    match &snapshot.sentiment {
        Some(s) => {
            put(&mut vector, FeatureName::MarketSentimentScore, s.composite);
            put(&mut vector, FeatureName::MarketConfidence, s.confidence);
            put(&mut vector, FeatureName::FearGreedIndex, s.fear_greed);
            put(
                &mut vector,
                FeatureName::MarketSentimentLabel,
                s.label as f64,
            );
            if let Ok(v) = serde_json::to_value(s) {
                raw.insert("sentiment".into(), v);
            }
        }
        None => {
            put(&mut vector, FeatureName::FearGreedIndex, 50.0);
        }
    }

    // -- AI predictors ------------------------------------------------------
    if let Some(predictions) = &snapshot.ai_predictions {
        let ai = ai_stats(predictions);
        put(&mut vector, FeatureName::AiAvgConfidence, ai.avg_confidence);
        put(&mut vector, FeatureName::AiUpCount, ai.up as f64);
        put(&mut vector, FeatureName::AiDownCount, ai.down as f64);
        put(&mut vector, FeatureName::AiAgreementRatio, ai.agreement);
        put(&mut vector, FeatureName::AiConsensus, ai.consensus);
    }

    // -- Order book ---------------------------------------------------------
    match &snapshot.order_book {
        Some(book) => {
            put(
                &mut vector,
                FeatureName::OrderbookImbalance,
                orderbook::imbalance(book),
            );
            put(
                &mut vector,
                FeatureName::SupportStrength,
                orderbook::support_strength(book),
            );
            put(
                &mut vector,
                FeatureName::ResistanceStrength,
                orderbook::resistance_strength(book),
            );
        }
        None => {
            put(&mut vector, FeatureName::SupportStrength, 50.0);
            put(&mut vector, FeatureName::ResistanceStrength, 50.0);
        }
    }

    // -- Macro --------------------------------------------------------------
    let (dxy, sp500, vix, risk_appetite) = match &snapshot.macro_data {
        Some(m) => {
            if let Ok(v) = serde_json::to_value(m) {
                raw.insert("macro".into(), v);
            }
            (
                m.dxy_change_pct,
                m.sp500_change_pct,
                m.vix_level,
                m.risk_appetite
                    .unwrap_or_else(|| derived_risk_appetite(m.sp500_change_pct, m.vix_level)),
            )
        }
        None => (0.0, 0.0, 20.0, 50.0),
    };
    put(&mut vector, FeatureName::DxyChange, dxy);
    put(&mut vector, FeatureName::Sp500Change, sp500);
    put(&mut vector, FeatureName::VixLevel, vix);
    put(&mut vector, FeatureName::RiskAppetite, risk_appetite);

    // -- Futures ------------------------------------------------------------
    if let Some(f) = &snapshot.futures {
        put(&mut vector, FeatureName::OiChange, f.oi_change_pct);
        put(&mut vector, FeatureName::FundingTrend, f.funding_trend);
        if let Ok(v) = serde_json::to_value(f) {
            raw.insert("futures".into(), v);
        }
    }

    // -- Prediction market (metadata only; no vector slot in this layout) ---
    if let Some(p) = &snapshot.prediction_market {
        if let Ok(v) = serde_json::to_value(p) {
            raw.insert("prediction_market".into(), v);
        }
    }

    let metadata = FeatureMetadata {
        symbol: symbol.to_string(),
        timestamp: now,
        availability,
        clamp_warnings: warnings,
        raw,
    };

    (vector, metadata)
}

/// `clamp(50 + sp500_pct * 5 - (vix - 20) * 2, 0, 100)` — the documented
/// monotone default when the macro adapter supplies no risk appetite.
pub fn derived_risk_appetite(sp500_pct: f64, vix: f64) -> f64 {
    (50.0 + sp500_pct * 5.0 - (vix - 20.0) * 2.0).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

struct WindowStats {
    current_price: f64,
    change_pct: f64,
    avg_volume: f64,
    volatility: f64,
    trend: f64,
    high: f64,
    low: f64,
    range_pct: f64,
}

fn window_stats(candles: &[Candle], config: &FeatureConfig) -> WindowStats {
    let closes: Vec<f64> = candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(0.0))
        .collect();

    let window_start = candles.len().saturating_sub(config.candle_window);
    let window = &candles[window_start..];
    let window_closes = &closes[window_start..];

    let current_price = *closes.last().expect("candles non-empty");
    let first_close = window_closes[0];

    let change_pct = if first_close > 0.0 {
        (current_price - first_close) / first_close * 100.0
    } else {
        0.0
    };

    let avg_volume = window
        .iter()
        .map(|c| c.volume.to_f64().unwrap_or(0.0))
        .sum::<f64>()
        / window.len() as f64;

    let mean_close = window_closes.iter().sum::<f64>() / window_closes.len() as f64;
    let volatility = if mean_close > 0.0 {
        let variance = window_closes
            .iter()
            .map(|c| (c - mean_close).powi(2))
            .sum::<f64>()
            / window_closes.len() as f64;
        variance.sqrt() / mean_close
    } else {
        0.0
    };

    let high = window
        .iter()
        .map(|c| c.high.to_f64().unwrap_or(0.0))
        .fold(f64::NEG_INFINITY, f64::max)
        .max(current_price);
    let low = window
        .iter()
        .map(|c| c.low.to_f64().unwrap_or(0.0))
        .fold(f64::INFINITY, f64::min)
        .min(current_price);

    let range_pct = if low > 0.0 {
        (high - low) / low * 100.0
    } else {
        0.0
    };

    WindowStats {
        current_price,
        change_pct,
        avg_volume,
        volatility,
        trend: ma_trend(&closes, config),
        high,
        low,
        range_pct,
    }
}

/// +1 when the short SMA exceeds the long SMA by at least epsilon (a
/// fraction of price), -1 on the inverse, 0 inside the band or with
/// insufficient history.
fn ma_trend(closes: &[f64], config: &FeatureConfig) -> f64 {
    if closes.len() < config.trend_ma_long {
        return 0.0;
    }

    let sma = |n: usize| closes[closes.len() - n..].iter().sum::<f64>() / n as f64;
    let short = sma(config.trend_ma_short);
    let long = sma(config.trend_ma_long);

    let price = *closes.last().expect("closes non-empty");
    let epsilon = config.trend_epsilon_fraction * price;

    if short - long >= epsilon {
        1.0
    } else if long - short >= epsilon {
        -1.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// AI aggregation
// ---------------------------------------------------------------------------

struct AiStats {
    avg_confidence: f64,
    up: usize,
    down: usize,
    agreement: f64,
    consensus: f64,
}

fn ai_stats(predictions: &[AiPrediction]) -> AiStats {
    let up = predictions
        .iter()
        .filter(|p| matches!(p, AiPrediction::Up(_)))
        .count();
    let down = predictions
        .iter()
        .filter(|p| matches!(p, AiPrediction::Down(_)))
        .count();

    let avg_confidence = if predictions.is_empty() {
        0.0
    } else {
        predictions.iter().map(|p| p.confidence()).sum::<f64>() / predictions.len() as f64
    };

    let total = up + down;
    let agreement = if total == 0 {
        0.0
    } else {
        up.max(down) as f64 / total as f64
    };

    // Minimum-gap rule: a one-vote margin is required for a consensus.
    let gap = up as f64 - down as f64;
    let consensus = if gap.abs() < 1.0 {
        0.0
    } else {
        gap.signum()
    };

    AiStats {
        avg_confidence,
        up,
        down,
        agreement,
        consensus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GasQuote;
    use rust_decimal::Decimal;

    fn cfg() -> (FeatureConfig, GateConfig) {
        (FeatureConfig::default(), GateConfig::default())
    }

    fn candle(ts: i64, close: f64) -> Candle {
        let d = |v: f64| Decimal::try_from(v).unwrap();
        Candle {
            open_ts: ts,
            open: d(close),
            high: d(close * 1.01),
            low: d(close * 0.99),
            close: d(close),
            volume: d(100.0),
        }
    }

    #[test]
    fn test_neutral_idempotence() {
        let (features, gates) = cfg();
        let (vector, meta) = integrate(&MarketSnapshot::default(), "BTCUSDT", 0, &features, &gates);

        assert!(meta.availability.all_unavailable());
        assert_eq!(vector.get(FeatureName::EthGas), 50.0);
        assert_eq!(vector.get(FeatureName::BtcFee), 20.0);
        assert_eq!(vector.get(FeatureName::EthTradeable), 0.0);
        assert_eq!(vector.get(FeatureName::BtcTradeable), 0.0);
        assert_eq!(vector.get(FeatureName::CurrentPrice), 0.0);
        assert_eq!(vector.get(FeatureName::Trend), 0.0);
        assert_eq!(vector.get(FeatureName::Volatility), 0.0);
        assert_eq!(vector.get(FeatureName::NewsCount), 0.0);
        assert_eq!(vector.get(FeatureName::FearGreedIndex), 50.0);
        assert_eq!(vector.get(FeatureName::AiAgreementRatio), 0.0);
        assert_eq!(vector.get(FeatureName::AiConsensus), 0.0);
        assert_eq!(vector.get(FeatureName::OrderbookImbalance), 0.0);
        assert_eq!(vector.get(FeatureName::SupportStrength), 50.0);
        assert_eq!(vector.get(FeatureName::ResistanceStrength), 50.0);
        assert_eq!(vector.get(FeatureName::VixLevel), 20.0);
        assert_eq!(vector.get(FeatureName::RiskAppetite), 50.0);
        assert_eq!(vector.get(FeatureName::OiChange), 0.0);
        assert_eq!(vector.get(FeatureName::FundingTrend), 0.0);
        assert!(vector.validate().is_ok());
    }

    #[test]
    fn test_gas_gates() {
        let (features, gates) = cfg();
        let snap = MarketSnapshot {
            gas: Some(GasQuote {
                eth_gwei: Some(12.0),
                btc_sat_vb: Some(40.0),
            }),
            ..Default::default()
        };
        let (vector, meta) = integrate(&snap, "BTCUSDT", 0, &features, &gates);
        assert!(meta.availability.gas);
        assert_eq!(vector.get(FeatureName::EthTradeable), 1.0);
        assert_eq!(vector.get(FeatureName::BtcTradeable), 0.0);
    }

    #[test]
    fn test_uptrend_detection() {
        let (features, gates) = cfg();
        let candles: Vec<Candle> = (0..48)
            .map(|i| candle(i as i64 * 3_600_000, 100.0 + i as f64))
            .collect();
        let snap = MarketSnapshot {
            candles: Some(candles),
            ..Default::default()
        };
        let (vector, _) = integrate(&snap, "BTCUSDT", 0, &features, &gates);

        assert_eq!(vector.get(FeatureName::Trend), 1.0);
        assert!(vector.get(FeatureName::PriceChangePct) > 0.0);
        assert!(vector.get(FeatureName::HighPrice) >= vector.get(FeatureName::CurrentPrice));
        assert!(vector.get(FeatureName::LowPrice) <= vector.get(FeatureName::CurrentPrice));
        assert!(vector.validate().is_ok());
    }

    #[test]
    fn test_flat_series_has_no_trend_and_zero_volatility() {
        let (features, gates) = cfg();
        let candles: Vec<Candle> = (0..48)
            .map(|i| candle(i as i64 * 3_600_000, 100.0))
            .collect();
        let snap = MarketSnapshot {
            candles: Some(candles),
            ..Default::default()
        };
        let (vector, _) = integrate(&snap, "BTCUSDT", 0, &features, &gates);
        assert_eq!(vector.get(FeatureName::Trend), 0.0);
        assert_eq!(vector.get(FeatureName::Volatility), 0.0);
    }

    #[test]
    fn test_ai_consensus_minimum_gap() {
        let preds = vec![
            AiPrediction::Up(80.0),
            AiPrediction::Down(70.0),
            AiPrediction::Flat(50.0),
        ];
        let stats = ai_stats(&preds);
        assert_eq!(stats.up, 1);
        assert_eq!(stats.down, 1);
        assert_eq!(stats.consensus, 0.0);
        assert_eq!(stats.agreement, 0.5);
    }

    #[test]
    fn test_ai_unanimous() {
        let preds = vec![AiPrediction::Up(80.0), AiPrediction::Up(70.0), AiPrediction::Up(90.0)];
        let stats = ai_stats(&preds);
        assert_eq!(stats.consensus, 1.0);
        assert_eq!(stats.agreement, 1.0);
        assert_eq!(stats.avg_confidence, 80.0);
    }

    #[test]
    fn test_derived_risk_appetite_monotone() {
        assert_eq!(derived_risk_appetite(0.0, 20.0), 50.0);
        assert!(derived_risk_appetite(2.0, 20.0) > 50.0);
        assert!(derived_risk_appetite(0.0, 40.0) < 50.0);
        assert_eq!(derived_risk_appetite(50.0, 0.0), 100.0);
    }

    #[test]
    fn test_clamp_warning_recorded() {
        let (features, gates) = cfg();
        let snap = MarketSnapshot {
            gas: Some(GasQuote {
                eth_gwei: Some(9_000.0),
                btc_sat_vb: Some(10.0),
            }),
            ..Default::default()
        };
        let (vector, meta) = integrate(&snap, "BTCUSDT", 0, &features, &gates);
        assert_eq!(vector.get(FeatureName::EthGas), 500.0);
        assert!(meta.clamp_warnings.iter().any(|w| w.contains("eth_gas")));
    }
}
