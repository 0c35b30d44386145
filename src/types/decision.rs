use serde::{Deserialize, Serialize};

/// Final action of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Long,
    Short,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
            Self::Hold => "HOLD",
        }
    }
}

/// Per-category scores produced by the weighted signal layer, all 0..100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub news_score: f64,
    pub price_score: f64,
    pub sentiment_score: f64,
    pub ai_score: f64,
    pub total_score: f64,
}

/// Outcome of the five-check safety gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub passed: bool,
    /// Failing check names with detail, empty when passed. Each reason starts
    /// with a stable code: cost / data / market_state / volatility / account,
    /// or "time-out" for a whole-request deadline.
    pub reasons: Vec<String>,
}

impl SafetyReport {
    pub fn passed() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    pub fn failed(reasons: Vec<String>) -> Self {
        Self {
            passed: false,
            reasons,
        }
    }
}

/// Advisory suggestion from the AI decision layer. Retained on the decision
/// even when the engine overrules it, so displays can show the divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySuggestion {
    pub action: Action,
    pub confidence: f64,
    /// Which sub-strategy (or "aggregate") produced the suggestion.
    pub strategy: String,
    pub reason: String,
}

/// Fully-resolved decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// 0..100.
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub scores: CategoryScores,
    /// Fraction of non-neutral directional signals sharing the majority sign.
    pub consistency: f64,
    pub safety: SafetyReport,
    pub suggestion: Option<StrategySuggestion>,
}

impl Decision {
    /// HOLD with a failed gate — the shape used for gate failures and
    /// whole-request timeouts alike.
    pub fn gated_hold(reasons: Vec<String>, suggestion: Option<StrategySuggestion>) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            reasons: reasons.clone(),
            scores: CategoryScores::default(),
            consistency: 0.0,
            safety: SafetyReport::failed(reasons),
            suggestion,
        }
    }
}

/// Account state supplied by the caller for the account gate and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: rust_decimal::Decimal,
    pub open_positions: usize,
}
