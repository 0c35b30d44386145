//! HTTP service — serves the one-shot pipeline per request.
//!
//! Concurrent requests are independent; the most recent successful analysis
//! for the default symbol is retained for `/api/decision` and
//! `/api/summary`, keyed by request id so a stale result never overwrites a
//! newer one.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::pipeline::{AnalysisData, Analyzer};
use crate::errors::PilotError;
use crate::types::AccountState;

/// Shared service state.
pub struct AppState {
    pub analyzer: Analyzer,
    pub account: AccountState,
    pub default_symbol: String,
    /// `(timestamp, data)` of the latest analysis for the default symbol.
    latest: RwLock<Option<(i64, AnalysisData)>>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        analyzer: Analyzer,
        account: AccountState,
        default_symbol: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            account,
            default_symbol,
            latest: RwLock::new(None),
            shutdown,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/decision", get(latest_decision))
        .route("/api/summary", get(latest_summary))
        .route("/api/health", get(health))
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "http service listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    symbol: String,
}

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

fn api_error(status: StatusCode, error: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(json!({ "status": "error", "error": error.to_string() })),
    )
}

/// `POST /api/analyze` — run the pipeline for the requested symbol.
async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult {
    let report = state
        .analyzer
        .analyze(&request.symbol, &state.account, &state.shutdown)
        .await
        .map_err(|e| match e {
            PilotError::InvalidInput { .. } => api_error(StatusCode::BAD_REQUEST, e),
            PilotError::InternalInconsistency { .. } => {
                error!(error = %e, "invariant violation");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
            other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other),
        })?;

    let data = report.to_data();

    if request.symbol == state.default_symbol {
        let mut latest = state.latest.write().await;
        // A slow older request must not clobber a newer result.
        let stale = latest
            .as_ref()
            .is_some_and(|(ts, _)| *ts > report.timestamp);
        if !stale {
            *latest = Some((report.timestamp, data.clone()));
        }
    }

    Ok(Json(json!({ "status": "success", "data": data })))
}

/// `GET /api/decision` — most recent analysis for the default symbol.
async fn latest_decision(State(state): State<Arc<AppState>>) -> ApiResult {
    match state.latest.read().await.as_ref() {
        Some((_, data)) => Ok(Json(json!({ "status": "success", "data": data }))),
        None => Err(api_error(StatusCode::NOT_FOUND, "no analysis yet")),
    }
}

/// `GET /api/summary` — human-readable text of the most recent analysis.
async fn latest_summary(State(state): State<Arc<AppState>>) -> Result<String, (StatusCode, Json<serde_json::Value>)> {
    match state.latest.read().await.as_ref() {
        Some((_, data)) => Ok(format_summary(&state.default_symbol, data)),
        None => Err(api_error(StatusCode::NOT_FOUND, "no analysis yet")),
    }
}

/// `GET /api/health`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "system": "perp-pilot",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Plain-text decision report.
pub fn format_summary(symbol: &str, data: &AnalysisData) -> String {
    let mut lines = Vec::new();
    let rule = "=".repeat(70);

    lines.push(rule.clone());
    lines.push(format!("Decision report — {symbol}"));
    lines.push(rule.clone());
    lines.push(format!("Time: {}", data.timestamp));
    lines.push(String::new());

    lines.push(format!(
        "Decision: {}  (confidence {:.0}%)",
        data.decision.action.as_str(),
        data.decision.confidence
    ));
    for reason in &data.decision.reasons {
        lines.push(format!("  - {reason}"));
    }
    lines.push(String::new());

    lines.push("Signals:".into());
    lines.push(format!("  news:      {:>5.1} / 100", data.signals.news_score));
    lines.push(format!("  price:     {:>5.1} / 100", data.signals.price_score));
    lines.push(format!("  sentiment: {:>5.1} / 100", data.signals.sentiment_score));
    lines.push(format!("  ai:        {:>5.1} / 100", data.signals.ai_score));
    lines.push(format!("  total:     {:>5.1} / 100", data.signals.total_score));
    lines.push(format!(
        "  consistency {:.0}%, regime {}",
        data.signals.consistency * 100.0,
        data.signals.regime.as_str()
    ));
    lines.push(String::new());

    if let Some(plan) = &data.position {
        lines.push("Position plan:".into());
        lines.push(format!("  side:       {}", plan.side.as_str()));
        lines.push(format!("  entry:      {}", plan.entry_price));
        lines.push(format!(
            "  stop loss:  {}  ({}%)",
            plan.stop_loss,
            plan.stop_loss_pct * rust_decimal_macros::dec!(100)
        ));
        for (i, tp) in plan.take_profits.iter().enumerate() {
            lines.push(format!(
                "  tp{}:        {}  (close {}%)",
                i + 1,
                tp.price,
                tp.close_fraction * rust_decimal_macros::dec!(100)
            ));
        }
        lines.push(format!("  size:       {} base / {} quote", plan.size_base, plan.size_quote));
        lines.push(format!("  margin:     {} at {}x", plan.margin, plan.leverage));
        lines.push(format!(
            "  max loss:   {}   expected: {}  (rr {})",
            plan.max_loss, plan.expected_profit, plan.risk_reward_ratio
        ));
        lines.push(String::new());
    }

    if let Some(suggestion) = &data.decision.suggestion {
        lines.push(format!(
            "AI layer: {} at {:.0}% via {} — {}",
            suggestion.action.as_str(),
            suggestion.confidence,
            suggestion.strategy,
            suggestion.reason
        ));
        lines.push(String::new());
    }

    let safety = &data.safety_checks;
    lines.push(format!(
        "Safety gate: {}",
        if safety.passed { "passed" } else { "FAILED" }
    ));
    for reason in &safety.reasons {
        lines.push(format!("  - {reason}"));
    }

    lines.push(rule);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PilotConfig;
    use crate::sources::SourceSet;
    use crate::types::MarketSnapshot;
    use rust_decimal_macros::dec;

    fn state() -> Arc<AppState> {
        let config = PilotConfig::default();
        let analyzer = Analyzer::new(config.clone(), SourceSet::disabled(config.adapters));
        Arc::new(AppState::new(
            analyzer,
            AccountState {
                balance: dec!(10_000),
                open_positions: 0,
            },
            "BTCUSDT".into(),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn test_health_shape() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["system"], "perp-pilot");
    }

    #[tokio::test]
    async fn test_decision_before_any_analysis_is_not_found() {
        let result = latest_decision(State(state())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_analyze_then_decision() {
        let state = state();

        let result = analyze(
            State(state.clone()),
            Json(AnalyzeRequest {
                symbol: "BTCUSDT".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.0["status"], "success");
        // All sources disabled: gate fails, decision is HOLD.
        assert_eq!(result.0["data"]["decision"]["action"], "HOLD");

        let latest = latest_decision(State(state)).await.unwrap();
        assert_eq!(latest.0["status"], "success");
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_bad_request() {
        let err = analyze(
            State(state()),
            Json(AnalyzeRequest {
                symbol: "not a symbol".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_summary_contains_decision() {
        let config = PilotConfig::default();
        let analyzer = Analyzer::new(config.clone(), SourceSet::disabled(config.adapters));
        let report = analyzer
            .evaluate_snapshot(
                "BTCUSDT",
                &AccountState {
                    balance: dec!(10_000),
                    open_positions: 0,
                },
                0,
                "req",
                &MarketSnapshot::default(),
            )
            .unwrap();

        let text = format_summary("BTCUSDT", &report.to_data());
        assert!(text.contains("Decision: HOLD"));
        assert!(text.contains("Safety gate: FAILED"));
    }
}
