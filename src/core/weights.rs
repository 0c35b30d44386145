//! Dynamic weight manager — regime classification and category multipliers.
//!
//! Classifies the current market regime from the feature vector, looks up
//! the configured multiplier table, then applies two adaptive adjustments
//! (suspected order-book spoofing and VIX stress). The manager only scales
//! scores; it never forces a HOLD.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::DynamicWeightConfig;
use crate::types::{FeatureName, FeatureVector};

/// Market regime decided from trend and recent change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Bull,
    Bear,
    Sideways,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bull => "bull",
            Self::Bear => "bear",
            Self::Sideways => "sideways",
        }
    }
}

/// Scoring/weighting category. `Technical` aliases the price category in the
/// sideways table; the remaining categories exist for gate-adjacent scaling
/// and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    News,
    Price,
    Sentiment,
    Ai,
    Orderbook,
    Macro,
    Futures,
    Technical,
    Risk,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::News,
        Self::Price,
        Self::Sentiment,
        Self::Ai,
        Self::Orderbook,
        Self::Macro,
        Self::Futures,
        Self::Technical,
        Self::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Price => "price",
            Self::Sentiment => "sentiment",
            Self::Ai => "ai",
            Self::Orderbook => "orderbook",
            Self::Macro => "macro",
            Self::Futures => "futures",
            Self::Technical => "technical",
            Self::Risk => "risk",
        }
    }
}

/// Regime verdict plus the category multiplier map the engine consumes.
/// Categories absent from the map are implicitly 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicWeights {
    pub regime: Regime,
    pub multipliers: HashMap<Category, f64>,
}

impl DynamicWeights {
    /// Unit multipliers — the engine behaves as if no manager ran.
    pub fn unit() -> Self {
        Self {
            regime: Regime::Sideways,
            multipliers: HashMap::new(),
        }
    }

    pub fn multiplier(&self, category: Category) -> f64 {
        // The sideways table boosts "technical", which scales the price
        // category in the four-dimension engine.
        let direct = self.multipliers.get(&category).copied();
        match (direct, category) {
            (Some(m), _) => m,
            (None, Category::Price) => self
                .multipliers
                .get(&Category::Technical)
                .copied()
                .unwrap_or(1.0),
            (None, _) => 1.0,
        }
    }
}

/// Stateless regime classifier + multiplier lookup over the config table.
pub struct DynamicWeightManager {
    config: DynamicWeightConfig,
}

impl DynamicWeightManager {
    pub fn new(config: DynamicWeightConfig) -> Self {
        Self { config }
    }

    /// bull: trend +1 and change above the threshold; bear: mirrored;
    /// sideways otherwise.
    pub fn classify(&self, features: &FeatureVector) -> Regime {
        let trend = features.get(FeatureName::Trend);
        let change = features.get(FeatureName::PriceChangePct);
        let threshold = self.config.regime_change_pct;

        if trend == 1.0 && change > threshold {
            Regime::Bull
        } else if trend == -1.0 && change < -threshold {
            Regime::Bear
        } else {
            Regime::Sideways
        }
    }

    /// Classify, look up the regime table, then apply the adaptive
    /// fine-tuning rules.
    pub fn evaluate(&self, features: &FeatureVector) -> DynamicWeights {
        let regime = self.classify(features);

        let mut multipliers: HashMap<Category, f64> = HashMap::new();
        if let Some(table) = self.config.multipliers.get(regime.as_str()) {
            for category in Category::ALL {
                if let Some(mult) = table.get(category.as_str()) {
                    multipliers.insert(category, *mult);
                }
            }
        }

        // Extreme top-of-book imbalance reads as suspected spoofing.
        let imbalance = features.get(FeatureName::OrderbookImbalance);
        if imbalance.abs() > self.config.spoof_imbalance_threshold {
            let entry = multipliers.entry(Category::Orderbook).or_insert(1.0);
            *entry *= self.config.spoof_orderbook_mult;
        }

        // VIX stress shifts weight toward risk/macro.
        let vix = features.get(FeatureName::VixLevel);
        if vix > self.config.vix_stress_threshold {
            *multipliers.entry(Category::Risk).or_insert(1.0) *= self.config.vix_risk_mult;
            *multipliers.entry(Category::Macro).or_insert(1.0) *= self.config.vix_macro_mult;
        }

        DynamicWeights {
            regime,
            multipliers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureVector;

    fn vector_with(settings: &[(FeatureName, f64)]) -> FeatureVector {
        let mut v = FeatureVector::zeroed();
        for (name, value) in settings {
            v.set(*name, *value);
        }
        v
    }

    fn manager() -> DynamicWeightManager {
        DynamicWeightManager::new(DynamicWeightConfig::default())
    }

    #[test]
    fn test_classify_bull() {
        let v = vector_with(&[
            (FeatureName::Trend, 1.0),
            (FeatureName::PriceChangePct, 3.0),
        ]);
        assert_eq!(manager().classify(&v), Regime::Bull);
    }

    #[test]
    fn test_classify_bear() {
        let v = vector_with(&[
            (FeatureName::Trend, -1.0),
            (FeatureName::PriceChangePct, -2.5),
        ]);
        assert_eq!(manager().classify(&v), Regime::Bear);
    }

    #[test]
    fn test_classify_sideways_on_weak_move() {
        // Trend up but change below the threshold.
        let v = vector_with(&[
            (FeatureName::Trend, 1.0),
            (FeatureName::PriceChangePct, 1.8),
        ]);
        assert_eq!(manager().classify(&v), Regime::Sideways);
    }

    #[test]
    fn test_bull_table_multipliers() {
        let v = vector_with(&[
            (FeatureName::Trend, 1.0),
            (FeatureName::PriceChangePct, 3.0),
        ]);
        let w = manager().evaluate(&v);
        assert_eq!(w.regime, Regime::Bull);
        assert_eq!(w.multiplier(Category::Sentiment), 1.3);
        assert_eq!(w.multiplier(Category::News), 1.2);
        assert_eq!(w.multiplier(Category::Macro), 0.8);
        // Unlisted category defaults to 1.0.
        assert_eq!(w.multiplier(Category::Price), 1.0);
    }

    #[test]
    fn test_sideways_technical_scales_price() {
        let w = manager().evaluate(&FeatureVector::zeroed());
        assert_eq!(w.regime, Regime::Sideways);
        assert_eq!(w.multiplier(Category::Price), 1.3);
        assert_eq!(w.multiplier(Category::Orderbook), 1.2);
    }

    #[test]
    fn test_spoof_suspicion_dampens_orderbook() {
        let v = vector_with(&[(FeatureName::OrderbookImbalance, 0.95)]);
        let w = manager().evaluate(&v);
        // Sideways table 1.2 then spoof dampening x0.7.
        assert!((w.multiplier(Category::Orderbook) - 0.84).abs() < 1e-9);
    }

    #[test]
    fn test_vix_stress_boosts_risk_and_macro() {
        let v = vector_with(&[(FeatureName::VixLevel, 35.0)]);
        let w = manager().evaluate(&v);
        assert!((w.multiplier(Category::Risk) - 1.3).abs() < 1e-9);
        assert!((w.multiplier(Category::Macro) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_unit_weights_are_all_one() {
        let w = DynamicWeights::unit();
        for category in Category::ALL {
            assert_eq!(w.multiplier(category), 1.0);
        }
    }
}
