//! Fixed-layout feature vector.
//!
//! The vector is the single currency between the integrator, the weight
//! manager, the decision engine, and the sub-strategies. The index layout is
//! a stable contract, but application code never indexes by integer — every
//! consumer reads through [`FeatureName`]. Indices 0..26 are the core layout;
//! 26..35 append order-book, macro, and futures features.

use serde::{Deserialize, Serialize};

use crate::errors::PilotError;

/// Named accessor for every vector position. The discriminant is the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum FeatureName {
    EthGas = 0,
    BtcFee = 1,
    EthTradeable = 2,
    BtcTradeable = 3,
    CurrentPrice = 4,
    PriceChangePct = 5,
    AvgVolume = 6,
    Volatility = 7,
    Trend = 8,
    HighPrice = 9,
    LowPrice = 10,
    PriceRangePct = 11,
    NewsScore = 12,
    NewsPosRatio = 13,
    NewsNegRatio = 14,
    NewsCount = 15,
    NewsSentimentLabel = 16,
    MarketSentimentScore = 17,
    MarketConfidence = 18,
    FearGreedIndex = 19,
    MarketSentimentLabel = 20,
    AiAvgConfidence = 21,
    AiUpCount = 22,
    AiDownCount = 23,
    AiAgreementRatio = 24,
    AiConsensus = 25,
    OrderbookImbalance = 26,
    SupportStrength = 27,
    ResistanceStrength = 28,
    DxyChange = 29,
    Sp500Change = 30,
    VixLevel = 31,
    RiskAppetite = 32,
    OiChange = 33,
    FundingTrend = 34,
}

impl FeatureName {
    pub const ALL: [FeatureName; FeatureVector::LEN] = [
        Self::EthGas,
        Self::BtcFee,
        Self::EthTradeable,
        Self::BtcTradeable,
        Self::CurrentPrice,
        Self::PriceChangePct,
        Self::AvgVolume,
        Self::Volatility,
        Self::Trend,
        Self::HighPrice,
        Self::LowPrice,
        Self::PriceRangePct,
        Self::NewsScore,
        Self::NewsPosRatio,
        Self::NewsNegRatio,
        Self::NewsCount,
        Self::NewsSentimentLabel,
        Self::MarketSentimentScore,
        Self::MarketConfidence,
        Self::FearGreedIndex,
        Self::MarketSentimentLabel,
        Self::AiAvgConfidence,
        Self::AiUpCount,
        Self::AiDownCount,
        Self::AiAgreementRatio,
        Self::AiConsensus,
        Self::OrderbookImbalance,
        Self::SupportStrength,
        Self::ResistanceStrength,
        Self::DxyChange,
        Self::Sp500Change,
        Self::VixLevel,
        Self::RiskAppetite,
        Self::OiChange,
        Self::FundingTrend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EthGas => "eth_gas",
            Self::BtcFee => "btc_fee",
            Self::EthTradeable => "eth_tradeable",
            Self::BtcTradeable => "btc_tradeable",
            Self::CurrentPrice => "current_price",
            Self::PriceChangePct => "price_change_pct",
            Self::AvgVolume => "avg_volume",
            Self::Volatility => "volatility",
            Self::Trend => "trend",
            Self::HighPrice => "high_price",
            Self::LowPrice => "low_price",
            Self::PriceRangePct => "price_range_pct",
            Self::NewsScore => "news_score",
            Self::NewsPosRatio => "news_pos_ratio",
            Self::NewsNegRatio => "news_neg_ratio",
            Self::NewsCount => "news_count",
            Self::NewsSentimentLabel => "news_sentiment_label",
            Self::MarketSentimentScore => "market_sentiment_score",
            Self::MarketConfidence => "market_confidence",
            Self::FearGreedIndex => "fear_greed_index",
            Self::MarketSentimentLabel => "market_sentiment_label",
            Self::AiAvgConfidence => "ai_avg_confidence",
            Self::AiUpCount => "ai_up_count",
            Self::AiDownCount => "ai_down_count",
            Self::AiAgreementRatio => "ai_agreement_ratio",
            Self::AiConsensus => "ai_consensus",
            Self::OrderbookImbalance => "orderbook_imbalance",
            Self::SupportStrength => "support_strength",
            Self::ResistanceStrength => "resistance_strength",
            Self::DxyChange => "dxy_change",
            Self::Sp500Change => "sp500_change",
            Self::VixLevel => "vix_level",
            Self::RiskAppetite => "risk_appetite",
            Self::OiChange => "oi_change",
            Self::FundingTrend => "funding_trend",
        }
    }

    /// Declared range for the position, used for clamping at integration time.
    /// `None` on either side means unbounded.
    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        match self {
            Self::EthGas => (Some(0.0), Some(500.0)),
            Self::BtcFee => (Some(0.0), Some(300.0)),
            Self::EthTradeable | Self::BtcTradeable => (Some(0.0), Some(1.0)),
            Self::CurrentPrice | Self::HighPrice | Self::LowPrice => (Some(0.0), None),
            Self::PriceChangePct => (Some(-100.0), Some(100.0)),
            Self::AvgVolume => (Some(0.0), None),
            Self::Volatility => (Some(0.0), Some(1.0)),
            Self::Trend => (Some(-1.0), Some(1.0)),
            Self::PriceRangePct => (Some(0.0), None),
            Self::NewsScore => (Some(-100.0), Some(100.0)),
            Self::NewsPosRatio | Self::NewsNegRatio => (Some(0.0), Some(1.0)),
            Self::NewsCount => (Some(0.0), None),
            Self::NewsSentimentLabel => (Some(-1.0), Some(1.0)),
            Self::MarketSentimentScore => (Some(-100.0), Some(100.0)),
            Self::MarketConfidence => (Some(0.0), Some(100.0)),
            Self::FearGreedIndex => (Some(0.0), Some(100.0)),
            Self::MarketSentimentLabel => (Some(-1.0), Some(1.0)),
            Self::AiAvgConfidence => (Some(0.0), Some(100.0)),
            Self::AiUpCount | Self::AiDownCount => (Some(0.0), None),
            Self::AiAgreementRatio => (Some(0.0), Some(1.0)),
            Self::AiConsensus => (Some(-1.0), Some(1.0)),
            Self::OrderbookImbalance => (Some(-1.0), Some(1.0)),
            Self::SupportStrength | Self::ResistanceStrength => (Some(0.0), Some(100.0)),
            Self::DxyChange | Self::Sp500Change => (Some(-100.0), Some(100.0)),
            Self::VixLevel => (Some(0.0), None),
            Self::RiskAppetite => (Some(0.0), Some(100.0)),
            Self::OiChange => (Some(-100.0), Some(100.0)),
            Self::FundingTrend => (Some(-1.0), Some(1.0)),
        }
    }

    /// Whether this position carries a -1/0/+1 label semantic.
    pub fn is_ternary_label(&self) -> bool {
        matches!(
            self,
            Self::Trend
                | Self::NewsSentimentLabel
                | Self::MarketSentimentLabel
                | Self::AiConsensus
        )
    }
}

/// Immutable fixed-length feature vector. Constructed once per request by the
/// integrator; mutation is crate-private.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// Advertised layout length. Every consumer reads through the name-based
    /// accessor, so a 26-entry deployment would only change this constant.
    pub const LEN: usize = 35;

    pub(crate) fn zeroed() -> Self {
        Self {
            values: vec![0.0; Self::LEN],
        }
    }

    pub(crate) fn set(&mut self, name: FeatureName, value: f64) {
        self.values[name as usize] = value;
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        self.values[name as usize]
    }

    /// Introspective accessor by snake_case feature name.
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        FeatureName::ALL
            .iter()
            .find(|f| f.as_str() == name)
            .map(|f| self.get(*f))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Verify the hard invariants of the layout. A violation is a contract
    /// breach upstream: the request is refused rather than scored.
    pub fn validate(&self) -> Result<(), PilotError> {
        for name in FeatureName::ALL {
            let v = self.get(name);
            if !v.is_finite() {
                return Err(PilotError::inconsistent(format!(
                    "feature {} is not finite",
                    name.as_str()
                )));
            }
            if name.is_ternary_label() && v != -1.0 && v != 0.0 && v != 1.0 {
                return Err(PilotError::inconsistent(format!(
                    "feature {} = {v} outside {{-1, 0, 1}}",
                    name.as_str()
                )));
            }
        }

        let up = self.get(FeatureName::AiUpCount);
        let down = self.get(FeatureName::AiDownCount);
        if up + down > 0.0 && self.get(FeatureName::AiAgreementRatio) > 1.0 {
            return Err(PilotError::inconsistent(
                "ai_agreement_ratio above 1 with non-zero predictor counts",
            ));
        }
        if up + down == 0.0
            && (self.get(FeatureName::AiAgreementRatio) != 0.0
                || self.get(FeatureName::AiConsensus) != 0.0)
        {
            return Err(PilotError::inconsistent(
                "zero predictors but non-neutral ai agreement/consensus",
            ));
        }

        let pos = self.get(FeatureName::NewsPosRatio);
        let neg = self.get(FeatureName::NewsNegRatio);
        if pos + neg > 1.0 + 1e-9 {
            return Err(PilotError::inconsistent(format!(
                "news_pos_ratio + news_neg_ratio = {:.4} exceeds 1",
                pos + neg
            )));
        }

        let high = self.get(FeatureName::HighPrice);
        let low = self.get(FeatureName::LowPrice);
        let current = self.get(FeatureName::CurrentPrice);
        if high > 0.0 && low > 0.0 && !(low <= current && current <= high) {
            return Err(PilotError::inconsistent(format!(
                "price window violated: low {low} / current {current} / high {high}"
            )));
        }

        Ok(())
    }
}

/// Which source families contributed real data to a vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAvailability {
    pub candles: bool,
    pub order_book: bool,
    pub gas: bool,
    pub news: bool,
    pub sentiment: bool,
    pub macro_data: bool,
    pub futures: bool,
    pub prediction_market: bool,
    pub ai: bool,
}

impl SourceAvailability {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all_unavailable(&self) -> bool {
        *self == Self::default()
    }
}

/// Sidecar record carried alongside a feature vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub symbol: String,
    /// Unix milliseconds of vector construction.
    pub timestamp: i64,
    pub availability: SourceAvailability,
    /// One entry per value that had to be clamped into its declared range.
    pub clamp_warnings: Vec<String>,
    /// Raw per-family payloads kept for debugging displays, keyed by family.
    pub raw: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_stable() {
        assert_eq!(FeatureName::ALL.len(), FeatureVector::LEN);
        assert_eq!(FeatureName::EthGas as usize, 0);
        assert_eq!(FeatureName::AiConsensus as usize, 25);
        assert_eq!(FeatureName::OrderbookImbalance as usize, 26);
        assert_eq!(FeatureName::FundingTrend as usize, 34);
    }

    #[test]
    fn test_get_by_name() {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::FearGreedIndex, 58.0);
        assert_eq!(v.get_by_name("fear_greed_index"), Some(58.0));
        assert_eq!(v.get_by_name("no_such_feature"), None);
    }

    #[test]
    fn test_validate_rejects_bad_ternary() {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::Trend, 0.5);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ratio_overflow() {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::NewsPosRatio, 0.7);
        v.set(FeatureName::NewsNegRatio, 0.6);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_phantom_consensus() {
        let mut v = FeatureVector::zeroed();
        // No predictors queried but a consensus claimed.
        v.set(FeatureName::AiConsensus, 1.0);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_price_window_violation() {
        let mut v = FeatureVector::zeroed();
        v.set(FeatureName::HighPrice, 100.0);
        v.set(FeatureName::LowPrice, 99.0);
        v.set(FeatureName::CurrentPrice, 150.0);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_zeroed() {
        assert!(FeatureVector::zeroed().validate().is_ok());
    }
}
