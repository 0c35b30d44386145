//! One-shot analysis pipeline.
//!
//! Fans the adapters out, integrates features, classifies the regime, runs
//! the advisory strategy layer and the decision engine, and plans the
//! position for a non-HOLD decision. The whole request is bounded by one
//! deadline; timing out is behaviourally identical to every adapter failing
//! — a HOLD with the gate marked failed and reason "time-out". A cancelled
//! request publishes nothing.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::errors::PilotError;
use crate::sources::SourceSet;
use crate::types::{
    AccountState, Action, Decision, FeatureMetadata, FeatureVector, MarketSnapshot, PositionPlan,
    Side,
};

use super::engine::DecisionEngine;
use super::integrator;
use super::planner::PositionPlanner;
use super::strategies::{AiDecisionLayer, AiLayerOutput};
use super::weights::{DynamicWeightManager, DynamicWeights, Regime};

/// Everything one analysis produced. The HTTP layer and the exporters both
/// shape their payloads from this.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub request_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub regime: Regime,
    pub decision: Decision,
    pub plan: Option<PositionPlan>,
    pub features: FeatureVector,
    pub metadata: FeatureMetadata,
    pub account: AccountState,
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_percent: Decimal,
    pub strategy_signals: Option<AiLayerOutput>,
}

/// Stable JSON payload for the HTTP surface and snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisData {
    pub decision: Decision,
    pub signals: SignalsBody,
    pub position: Option<PositionPlan>,
    pub risk_management: RiskBody,
    pub safety_checks: crate::types::SafetyReport,
    /// RFC 3339.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsBody {
    pub news_score: f64,
    pub price_score: f64,
    pub sentiment_score: f64,
    pub ai_score: f64,
    pub total_score: f64,
    pub consistency: f64,
    pub regime: Regime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBody {
    #[serde(with = "rust_decimal::serde::str")]
    pub account_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_risk_amount: Decimal,
    pub open_positions: usize,
}

impl AnalysisReport {
    pub fn to_data(&self) -> AnalysisData {
        AnalysisData {
            decision: self.decision.clone(),
            signals: SignalsBody {
                news_score: self.decision.scores.news_score,
                price_score: self.decision.scores.price_score,
                sentiment_score: self.decision.scores.sentiment_score,
                ai_score: self.decision.scores.ai_score,
                total_score: self.decision.scores.total_score,
                consistency: self.decision.consistency,
                regime: self.regime,
            },
            position: self.plan.clone(),
            risk_management: RiskBody {
                account_balance: self.account.balance,
                risk_percent: self.risk_percent,
                max_risk_amount: self.account.balance * self.risk_percent,
                open_positions: self.account.open_positions,
            },
            safety_checks: self.decision.safety.clone(),
            timestamp: chrono::DateTime::from_timestamp_millis(self.timestamp)
                .unwrap_or_default()
                .to_rfc3339(),
        }
    }
}

/// The assembled one-shot pipeline.
pub struct Analyzer {
    sources: SourceSet,
    engine: DecisionEngine,
    planner: PositionPlanner,
    weight_manager: DynamicWeightManager,
    ai_layer: AiDecisionLayer,
    config: PilotConfig,
    request_counter: AtomicU64,
}

impl Analyzer {
    pub fn new(config: PilotConfig, sources: SourceSet) -> Self {
        Self {
            engine: DecisionEngine::new(
                config.gates.clone(),
                config.weights.clone(),
                config.thresholds.clone(),
            ),
            planner: PositionPlanner::new(config.risk.clone()),
            weight_manager: DynamicWeightManager::new(config.dynamic_weights.clone()),
            ai_layer: AiDecisionLayer::new(config.ai_layer.clone()),
            sources,
            config,
            request_counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Run one full analysis for `symbol`.
    ///
    /// Only `InvalidInput` (bad symbol, cancelled caller) and
    /// `InternalInconsistency` surface as errors; everything else is a
    /// well-formed report.
    pub async fn analyze(
        &self,
        symbol: &str,
        account: &AccountState,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, PilotError> {
        validate_symbol(symbol)?;

        let now = chrono::Utc::now().timestamp_millis();
        let request_id = format!(
            "{symbol}-{now}-{}",
            self.request_counter.fetch_add(1, Ordering::Relaxed)
        );

        let deadline =
            std::time::Duration::from_secs(self.sources.config().request_timeout_secs);

        let work = self.analyze_inner(symbol, account, now, &request_id);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(request_id, "analysis cancelled by caller");
                Err(PilotError::invalid("request cancelled"))
            }
            result = tokio::time::timeout(deadline, work) => match result {
                Ok(report) => report,
                Err(_) => {
                    warn!(request_id, timeout_secs = deadline.as_secs(), "whole-request deadline hit");
                    Ok(self.timeout_report(symbol, account, now, request_id.clone()))
                }
            },
        }
    }

    async fn analyze_inner(
        &self,
        symbol: &str,
        account: &AccountState,
        now: i64,
        request_id: &str,
    ) -> Result<AnalysisReport, PilotError> {
        let snapshot = self.sources.fetch_all(symbol, now).await;
        self.evaluate_snapshot(symbol, account, now, request_id, &snapshot)
    }

    /// Pure tail of the pipeline, shared with the backtester (which supplies
    /// its own snapshots instead of fetching).
    pub fn evaluate_snapshot(
        &self,
        symbol: &str,
        account: &AccountState,
        now: i64,
        request_id: &str,
        snapshot: &MarketSnapshot,
    ) -> Result<AnalysisReport, PilotError> {
        let (features, metadata) = integrator::integrate(
            snapshot,
            symbol,
            now,
            &self.config.features,
            &self.config.gates,
        );

        let dynamic = if self.config.dynamic_weights.enabled {
            self.weight_manager.evaluate(&features)
        } else {
            DynamicWeights::unit()
        };

        let strategy_output = if self.config.ai_layer.enabled {
            let candles: &[crate::types::Candle] =
                snapshot.candles.as_deref().unwrap_or(&[]);
            Some(self.ai_layer.evaluate(candles, &features))
        } else {
            None
        };
        let suggestion = strategy_output
            .as_ref()
            .and_then(|o| o.suggestion.clone());

        let mut decision = self
            .engine
            .evaluate(&features, account, &dynamic, suggestion)?;

        let plan = match decision.action {
            Action::Hold => None,
            action => {
                let side = match action {
                    Action::Long => Side::Long,
                    Action::Short => Side::Short,
                    Action::Hold => unreachable!("hold handled above"),
                };

                let entry = snapshot.last_price().unwrap_or(Decimal::ZERO);
                let volatility = features.get(crate::types::FeatureName::Volatility);

                match self.planner.plan(side, entry, volatility, account.balance) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        // A planner failure downgrades rather than erroring:
                        // the caller still gets a well-formed HOLD.
                        warn!(error = %e, "planner failed, downgrading to HOLD");
                        decision.action = Action::Hold;
                        decision.confidence = 50.0;
                        decision.reasons.push("invalid inputs for the position plan".into());
                        None
                    }
                }
            }
        };

        info!(
            request_id,
            symbol,
            action = decision.action.as_str(),
            confidence = decision.confidence,
            total = decision.scores.total_score,
            regime = dynamic.regime.as_str(),
            "analysis complete"
        );

        Ok(AnalysisReport {
            symbol: symbol.to_string(),
            request_id: request_id.to_string(),
            timestamp: now,
            regime: dynamic.regime,
            decision,
            plan,
            features,
            metadata,
            account: account.clone(),
            risk_percent: self.config.risk.risk_percent,
            strategy_signals: strategy_output,
        })
    }

    /// The all-adapters-failed shape used for a whole-request timeout.
    fn timeout_report(
        &self,
        symbol: &str,
        account: &AccountState,
        now: i64,
        request_id: String,
    ) -> AnalysisReport {
        let (features, metadata) = integrator::integrate(
            &MarketSnapshot::default(),
            symbol,
            now,
            &self.config.features,
            &self.config.gates,
        );

        AnalysisReport {
            symbol: symbol.to_string(),
            request_id,
            timestamp: now,
            regime: Regime::Sideways,
            decision: Decision::gated_hold(vec!["time-out".into()], None),
            plan: None,
            features,
            metadata,
            account: account.clone(),
            risk_percent: self.config.risk.risk_percent,
            strategy_signals: None,
        }
    }
}

/// Symbols are exchange tokens like `BTCUSDT`: short, alphanumeric, upper.
fn validate_symbol(symbol: &str) -> Result<(), PilotError> {
    let ok = !symbol.is_empty()
        && symbol.len() <= 20
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_lowercase());
    if ok {
        Ok(())
    } else {
        Err(PilotError::invalid(format!("malformed symbol {symbol:?}")))
    }
}
