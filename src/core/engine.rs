//! Decision engine — safety gate, weighted signal scoring, conservative
//! thresholding.
//!
//! The engine is pure CPU over a validated feature vector. It never opens a
//! position on partial information: all five gate checks must pass, the
//! weighted total must clear a strict threshold, and the directional signals
//! must agree. Anything less is a HOLD with the reasons spelled out.

use tracing::debug;

use crate::config::{GateConfig, ThresholdConfig, WeightConfig};
use crate::errors::PilotError;
use crate::types::{
    AccountState, Action, CategoryScores, Decision, FeatureName, FeatureVector, SafetyReport,
    StrategySuggestion,
};

use super::weights::{Category, DynamicWeights};

/// Safety gate + weighted scoring + conservative decision.
pub struct DecisionEngine {
    gates: GateConfig,
    weights: WeightConfig,
    thresholds: ThresholdConfig,
}

impl DecisionEngine {
    pub fn new(gates: GateConfig, weights: WeightConfig, thresholds: ThresholdConfig) -> Self {
        Self {
            gates,
            weights,
            thresholds,
        }
    }

    /// Run the full three-phase evaluation. The suggestion from the AI layer
    /// is carried through for display regardless of the outcome; it never
    /// overrides the engine here.
    pub fn evaluate(
        &self,
        features: &FeatureVector,
        account: &AccountState,
        dynamic: &DynamicWeights,
        suggestion: Option<StrategySuggestion>,
    ) -> Result<Decision, PilotError> {
        features.validate()?;

        // Phase 1: safety gate.
        if self.gates.enabled {
            let failures = self.safety_failures(features, account);
            if !failures.is_empty() {
                debug!(?failures, "safety gate blocked");
                let mut decision = Decision::gated_hold(failures, suggestion);
                // Gate failures still report what the signals said.
                decision.scores = self.score(features, dynamic);
                decision.consistency = consistency(features);
                return Ok(decision);
            }
        }

        // Phase 2: weighted signal scoring.
        let scores = self.score(features, dynamic);
        let consistency = consistency(features);

        // Phase 3: conservative decision.
        let (action, confidence, mut reasons) =
            self.decide(scores.total_score, consistency, features);

        if let Some(s) = &suggestion {
            if s.action != action {
                reasons.push(format!(
                    "ai layer diverges: suggested {} at {:.0}% via {}",
                    s.action.as_str(),
                    s.confidence,
                    s.strategy
                ));
            }
        }

        Ok(Decision {
            action,
            confidence,
            reasons,
            scores,
            consistency,
            safety: SafetyReport::passed(),
            suggestion,
        })
    }

    // -----------------------------------------------------------------------
    // Phase 1: safety gate
    // -----------------------------------------------------------------------

    /// All five checks, collected rather than short-circuited so the caller
    /// sees every failing gate at once. Reason strings start with a stable
    /// code: cost / data / market_state / volatility / account.
    fn safety_failures(&self, features: &FeatureVector, account: &AccountState) -> Vec<String> {
        let mut failures = Vec::new();

        let eth_ok = features.get(FeatureName::EthTradeable) == 1.0;
        let btc_ok = features.get(FeatureName::BtcTradeable) == 1.0;
        if !eth_ok && !btc_ok {
            failures.push(format!(
                "cost: network fees above gates (eth {:.1} gwei, btc {:.1} sat/vB)",
                features.get(FeatureName::EthGas),
                features.get(FeatureName::BtcFee)
            ));
        }

        let news_count = features.get(FeatureName::NewsCount);
        let predictors =
            features.get(FeatureName::AiUpCount) + features.get(FeatureName::AiDownCount);
        if news_count < self.gates.min_news_count || predictors <= 0.0 {
            failures.push(format!(
                "data: incomplete inputs ({news_count:.0} news items, {predictors:.0} directional predictors)"
            ));
        }

        let fgi = features.get(FeatureName::FearGreedIndex);
        if fgi <= self.gates.fear_greed_floor || fgi >= self.gates.fear_greed_ceil {
            failures.push(format!(
                "market_state: fear/greed index {fgi:.0} outside {}..{}",
                self.gates.fear_greed_floor, self.gates.fear_greed_ceil
            ));
        }

        let volatility = features.get(FeatureName::Volatility);
        if volatility >= self.gates.max_volatility {
            failures.push(format!(
                "volatility: {:.2}% at or above cap {:.2}%",
                volatility * 100.0,
                self.gates.max_volatility * 100.0
            ));
        }

        if account.open_positions >= self.gates.max_open_positions
            || account.balance <= self.gates.min_balance
        {
            failures.push(format!(
                "account: {} open positions, balance {}",
                account.open_positions, account.balance
            ));
        }

        failures
    }

    // -----------------------------------------------------------------------
    // Phase 2: weighted signal scoring
    // -----------------------------------------------------------------------

    pub fn score(&self, features: &FeatureVector, dynamic: &DynamicWeights) -> CategoryScores {
        let news = news_score(features);
        let price = price_score(features);
        let sentiment = sentiment_score(features);
        let ai = ai_score(features);

        let pairs = [
            (news, self.weights.news, dynamic.multiplier(Category::News)),
            (price, self.weights.price, dynamic.multiplier(Category::Price)),
            (
                sentiment,
                self.weights.sentiment,
                dynamic.multiplier(Category::Sentiment),
            ),
            (ai, self.weights.ai, dynamic.multiplier(Category::Ai)),
        ];

        let numerator: f64 = pairs.iter().map(|(s, w, m)| s * w * m).sum();
        let denominator: f64 = pairs.iter().map(|(_, w, m)| w * m).sum();
        let total = if denominator > 0.0 {
            (numerator / denominator).clamp(0.0, 100.0)
        } else {
            50.0
        };

        CategoryScores {
            news_score: news,
            price_score: price,
            sentiment_score: sentiment,
            ai_score: ai,
            total_score: total,
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: conservative decision
    // -----------------------------------------------------------------------

    fn decide(
        &self,
        total: f64,
        consistency: f64,
        features: &FeatureVector,
    ) -> (Action, f64, Vec<String>) {
        let fgi = features.get(FeatureName::FearGreedIndex);
        let t = &self.thresholds;

        if total > t.buy_score && consistency > t.min_consistency && fgi < t.long_fear_greed_ceil {
            return (
                Action::Long,
                total.clamp(0.0, 100.0),
                vec![format!(
                    "strong multi-dimension bullish alignment (consistency {:.0}%)",
                    consistency * 100.0
                )],
            );
        }

        if total < t.sell_score && consistency > t.min_consistency && fgi > t.short_fear_greed_floor
        {
            return (
                Action::Short,
                (100.0 - total).clamp(0.0, 100.0),
                vec![format!(
                    "strong multi-dimension bearish alignment (consistency {:.0}%)",
                    consistency * 100.0
                )],
            );
        }

        let mut reasons = Vec::new();
        if (t.sell_score..=t.buy_score).contains(&total) {
            reasons.push(format!("score: total {total:.0} in the neutral band"));
        }
        if consistency <= t.min_consistency {
            reasons.push(format!(
                "consistency: {:.0}% below the {:.0}% requirement",
                consistency * 100.0,
                t.min_consistency * 100.0
            ));
        }
        if fgi >= t.long_fear_greed_ceil && total > t.buy_score {
            reasons.push(format!("market_state: fear/greed {fgi:.0} too greedy for a long"));
        }
        if fgi <= t.short_fear_greed_floor && total < t.sell_score {
            reasons.push(format!("market_state: fear/greed {fgi:.0} too fearful for a short"));
        }
        if reasons.is_empty() {
            reasons.push("signals inconclusive".into());
        }

        (Action::Hold, 50.0, reasons)
    }
}

// ---------------------------------------------------------------------------
// Category scores (piecewise-additive rules, each clamped to 0..100)
// ---------------------------------------------------------------------------

/// News: label ±15; ratio dominance ±10; item count ±5.
pub fn news_score(features: &FeatureVector) -> f64 {
    let mut score: f64 = 50.0;

    match features.get(FeatureName::NewsSentimentLabel) {
        l if l == 1.0 => score += 15.0,
        l if l == -1.0 => score -= 15.0,
        _ => {}
    }

    let pos = features.get(FeatureName::NewsPosRatio);
    let neg = features.get(FeatureName::NewsNegRatio);
    if pos > 0.25 && neg < 0.15 {
        score += 10.0;
    } else if neg > 0.25 && pos < 0.15 {
        score -= 10.0;
    }

    let count = features.get(FeatureName::NewsCount);
    if count > 15.0 {
        score += 5.0;
    } else if count < 5.0 {
        score -= 5.0;
    }

    score.clamp(0.0, 100.0)
}

/// Price: trend ±15; moderate moves favoured over extremes; low volatility
/// rewarded, high volatility penalised.
pub fn price_score(features: &FeatureVector) -> f64 {
    let mut score: f64 = 50.0;

    match features.get(FeatureName::Trend) {
        t if t == 1.0 => score += 15.0,
        t if t == -1.0 => score -= 15.0,
        _ => {}
    }

    let change = features.get(FeatureName::PriceChangePct);
    if change > 0.5 && change < 2.5 {
        score += 10.0;
    } else if change >= 2.5 {
        score += 5.0;
    } else if change < -0.5 && change > -2.5 {
        score -= 10.0;
    } else if change <= -2.5 {
        score -= 5.0;
    }

    let volatility = features.get(FeatureName::Volatility);
    if volatility < 0.015 {
        score += 10.0;
    } else if volatility < 0.025 {
        score += 5.0;
    } else if volatility > 0.04 {
        score -= 10.0;
    }

    score.clamp(0.0, 100.0)
}

/// Sentiment: mild optimism is the ideal band; extremes are contrarian
/// penalties; the market label adds ±10.
pub fn sentiment_score(features: &FeatureVector) -> f64 {
    let mut score: f64 = 50.0;

    let fgi = features.get(FeatureName::FearGreedIndex);
    if fgi > 50.0 && fgi < 65.0 {
        score += 15.0;
    } else if fgi > 35.0 && fgi < 50.0 {
        score += 10.0;
    } else if fgi >= 75.0 {
        score -= 15.0;
    } else if fgi <= 25.0 {
        score -= 10.0;
    }

    match features.get(FeatureName::MarketSentimentLabel) {
        l if l == 1.0 => score += 10.0,
        l if l == -1.0 => score -= 10.0,
        _ => {}
    }

    score.clamp(0.0, 100.0)
}

/// AI: consensus ±10; high agreement +10, low agreement -5.
pub fn ai_score(features: &FeatureVector) -> f64 {
    let mut score: f64 = 50.0;

    match features.get(FeatureName::AiConsensus) {
        c if c == 1.0 => score += 10.0,
        c if c == -1.0 => score -= 10.0,
        _ => {}
    }

    let agreement = features.get(FeatureName::AiAgreementRatio);
    if agreement > 0.7 {
        score += 10.0;
    } else if agreement < 0.4 {
        score -= 5.0;
    }

    score.clamp(0.0, 100.0)
}

/// Fraction of non-neutral directional signals (news label, trend, market
/// label, ai consensus) sharing the majority sign; 0 when all four are
/// neutral.
pub fn consistency(features: &FeatureVector) -> f64 {
    let signals: Vec<f64> = [
        FeatureName::NewsSentimentLabel,
        FeatureName::Trend,
        FeatureName::MarketSentimentLabel,
        FeatureName::AiConsensus,
    ]
    .iter()
    .map(|n| features.get(*n))
    .filter(|v| *v != 0.0)
    .collect();

    if signals.is_empty() {
        return 0.0;
    }

    let positive = signals.iter().filter(|v| **v > 0.0).count();
    let negative = signals.len() - positive;

    positive.max(negative) as f64 / signals.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GateConfig, ThresholdConfig, WeightConfig};
    use rust_decimal_macros::dec;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(
            GateConfig::default(),
            WeightConfig::default(),
            ThresholdConfig::default(),
        )
    }

    fn account() -> AccountState {
        AccountState {
            balance: dec!(10_000),
            open_positions: 0,
        }
    }

    /// The "clean long" vector from the acceptance scenarios.
    fn bullish_vector() -> FeatureVector {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::EthGas, 15.0);
        v.set(FeatureName::BtcFee, 8.0);
        v.set(FeatureName::EthTradeable, 1.0);
        v.set(FeatureName::BtcTradeable, 1.0);
        v.set(FeatureName::CurrentPrice, 50_000.0);
        v.set(FeatureName::PriceChangePct, 1.8);
        v.set(FeatureName::AvgVolume, 1_000_000.0);
        v.set(FeatureName::Volatility, 0.012);
        v.set(FeatureName::Trend, 1.0);
        v.set(FeatureName::HighPrice, 51_000.0);
        v.set(FeatureName::LowPrice, 49_500.0);
        v.set(FeatureName::PriceRangePct, 3.0);
        v.set(FeatureName::NewsPosRatio, 0.35);
        v.set(FeatureName::NewsNegRatio, 0.08);
        v.set(FeatureName::NewsCount, 12.0);
        v.set(FeatureName::NewsSentimentLabel, 1.0);
        v.set(FeatureName::FearGreedIndex, 58.0);
        v.set(FeatureName::MarketSentimentLabel, 1.0);
        v.set(FeatureName::AiAvgConfidence, 80.0);
        v.set(FeatureName::AiUpCount, 3.0);
        v.set(FeatureName::AiAgreementRatio, 1.0);
        v.set(FeatureName::AiConsensus, 1.0);
        v.set(FeatureName::SupportStrength, 50.0);
        v.set(FeatureName::ResistanceStrength, 50.0);
        v.set(FeatureName::VixLevel, 20.0);
        v.set(FeatureName::RiskAppetite, 50.0);
        v
    }

    // -- Category scores -----------------------------------------------------

    #[test]
    fn test_bullish_category_scores() {
        let v = bullish_vector();
        assert_eq!(news_score(&v), 75.0);
        assert_eq!(price_score(&v), 85.0);
        assert_eq!(sentiment_score(&v), 75.0);
        assert_eq!(ai_score(&v), 70.0);
    }

    #[test]
    fn test_price_score_monotone_in_trend() {
        let mut v = bullish_vector();
        let mut last = f64::NEG_INFINITY;
        for trend in [-1.0, 0.0, 1.0] {
            v.set(FeatureName::Trend, trend);
            let s = price_score(&v);
            assert!(s >= last, "price score decreased as trend rose");
            last = s;
        }
    }

    #[test]
    fn test_price_score_monotone_in_volatility_bands() {
        let mut v = bullish_vector();
        let mut last = f64::NEG_INFINITY;
        // High band down into the low band.
        for vol in [0.05, 0.03, 0.02, 0.01] {
            v.set(FeatureName::Volatility, vol);
            let s = price_score(&v);
            assert!(s >= last, "price score decreased as volatility fell");
            last = s;
        }
    }

    // -- Consistency ---------------------------------------------------------

    #[test]
    fn test_consistency_unanimous() {
        assert_eq!(consistency(&bullish_vector()), 1.0);
    }

    #[test]
    fn test_consistency_split() {
        let mut v = bullish_vector();
        v.set(FeatureName::NewsSentimentLabel, -1.0);
        v.set(FeatureName::AiConsensus, 0.0);
        // Signals: -1, +1, +1 -> 2/3.
        let c = consistency(&v);
        assert!((c - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_consistency_all_neutral_is_zero() {
        assert_eq!(consistency(&FeatureVector::zeroed()), 0.0);
    }

    // -- Gate supremacy ------------------------------------------------------

    #[test]
    fn test_clean_long() {
        let d = engine()
            .evaluate(&bullish_vector(), &account(), &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Long);
        assert!(d.confidence >= 75.0);
        assert!(d.safety.passed);
        assert!(d.scores.total_score > 75.0);
    }

    #[test]
    fn test_gate_fail_on_gas_forces_hold() {
        let mut v = bullish_vector();
        v.set(FeatureName::EthGas, 120.0);
        v.set(FeatureName::BtcFee, 50.0);
        v.set(FeatureName::EthTradeable, 0.0);
        v.set(FeatureName::BtcTradeable, 0.0);

        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.0);
        assert!(!d.safety.passed);
        assert!(d.safety.reasons.iter().any(|r| r.starts_with("cost")));
    }

    #[test]
    fn test_gate_fail_on_extreme_sentiment_keeps_suggestion() {
        let mut v = bullish_vector();
        v.set(FeatureName::FearGreedIndex, 85.0);

        let suggestion = StrategySuggestion {
            action: Action::Long,
            confidence: 80.0,
            strategy: "trend_following".into(),
            reason: "clear uptrend".into(),
        };

        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), Some(suggestion))
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.safety.reasons.iter().any(|r| r.starts_with("market_state")));
        // The AI suggestion survives for display.
        let s = d.suggestion.expect("suggestion retained");
        assert_eq!(s.action, Action::Long);
    }

    #[test]
    fn test_gate_fail_on_volatility() {
        let mut v = bullish_vector();
        v.set(FeatureName::Volatility, 0.05);
        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.safety.reasons.iter().any(|r| r.starts_with("volatility")));
    }

    #[test]
    fn test_gate_fail_on_data_completeness() {
        let mut v = bullish_vector();
        v.set(FeatureName::NewsCount, 3.0);
        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), None)
            .unwrap();
        assert!(d.safety.reasons.iter().any(|r| r.starts_with("data")));
    }

    #[test]
    fn test_gate_fail_on_account_state() {
        let broke = AccountState {
            balance: dec!(50),
            open_positions: 0,
        };
        let d = engine()
            .evaluate(&bullish_vector(), &broke, &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.safety.reasons.iter().any(|r| r.starts_with("account")));

        let maxed = AccountState {
            balance: dec!(10_000),
            open_positions: 3,
        };
        let d = engine()
            .evaluate(&bullish_vector(), &maxed, &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Hold);
    }

    // -- Conservative thresholds ---------------------------------------------

    #[test]
    fn test_insufficient_consistency_holds() {
        let mut v = bullish_vector();
        v.set(FeatureName::NewsSentimentLabel, -1.0);
        v.set(FeatureName::AiConsensus, 0.0);
        v.set(FeatureName::AiUpCount, 1.0);
        v.set(FeatureName::AiDownCount, 1.0);
        v.set(FeatureName::AiAgreementRatio, 0.5);

        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), None)
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.consistency < 0.8);
        assert!(d.reasons.iter().any(|r| r.contains("consistency")));
    }

    #[test]
    fn test_invalid_vector_is_refused() {
        let mut v = bullish_vector();
        v.set(FeatureName::Trend, 0.5);
        let err = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), None)
            .unwrap_err();
        assert!(matches!(err, PilotError::InternalInconsistency { .. }));
    }

    #[test]
    fn test_divergence_recorded_when_engine_holds() {
        let mut v = bullish_vector();
        // Push the total into the neutral band.
        v.set(FeatureName::NewsSentimentLabel, 0.0);
        v.set(FeatureName::NewsPosRatio, 0.1);
        v.set(FeatureName::MarketSentimentLabel, 0.0);

        let suggestion = StrategySuggestion {
            action: Action::Long,
            confidence: 75.0,
            strategy: "breakout".into(),
            reason: "range break".into(),
        };

        let d = engine()
            .evaluate(&v, &account(), &DynamicWeights::unit(), Some(suggestion))
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasons.iter().any(|r| r.contains("ai layer diverges")));
    }

    // -- Weight composition --------------------------------------------------

    #[test]
    fn test_bull_multipliers_never_lower_weighted_sum() {
        use crate::config::DynamicWeightConfig;
        use crate::core::weights::DynamicWeightManager;

        let mut v = bullish_vector();
        v.set(FeatureName::PriceChangePct, 2.4); // bull regime

        let manager = DynamicWeightManager::new(DynamicWeightConfig::default());
        let dynamic = manager.evaluate(&v);
        assert_eq!(dynamic.regime, crate::core::weights::Regime::Bull);

        let w = WeightConfig::default();
        let scores = [
            (news_score(&v), w.news, Category::News),
            (price_score(&v), w.price, Category::Price),
            (sentiment_score(&v), w.sentiment, Category::Sentiment),
            (ai_score(&v), w.ai, Category::Ai),
        ];

        let unit_sum: f64 = scores.iter().map(|(s, w, _)| s * w).sum();
        let bull_sum: f64 = scores
            .iter()
            .map(|(s, w, c)| s * w * dynamic.multiplier(*c))
            .sum();
        assert!(bull_sum >= unit_sum);
    }
}
