use thiserror::Error;

/// Typed error hierarchy for the decision pipeline.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation. Recoverable conditions (gate failures,
/// insufficient score) are expressed as HOLD decisions, never as errors —
/// only invalid input and invariant violations refuse a request.
#[derive(Error, Debug)]
pub enum PilotError {
    // -- Adapters -----------------------------------------------------------
    #[error("data source unavailable: {family}")]
    SourceUnavailable { family: &'static str },

    // -- Input --------------------------------------------------------------
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- Planner ------------------------------------------------------------
    #[error("position planner failed: {reason}")]
    PlannerFailed { reason: String },

    // -- Deadlines ----------------------------------------------------------
    #[error("request deadline exceeded after {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    // -- Invariants ---------------------------------------------------------
    #[error("internal inconsistency: {reason}")]
    InternalInconsistency { reason: String },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PilotError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            reason: reason.into(),
        }
    }
}
