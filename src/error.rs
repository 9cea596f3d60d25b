//! Error taxonomy for the decision-and-execution core.
//!
//! Indicator, regime, and signal-generation code never fails by
//! construction (undefined values are represented with `None`, not
//! errors); only the orchestrator and the control-plane session
//! operations can fail, and they fail with one of the kinds below.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("insufficient data: need at least {required} candles, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("stale data: latest candle is {age_ms}ms old, tolerance is {tolerance_ms}ms")]
    StaleData { age_ms: i64, tolerance_ms: i64 },

    #[error("fetch failed: {reason}")]
    FetchFailure { reason: String },

    #[error("session already active for asset {asset}")]
    SessionAlreadyActive { asset: String },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session not active: {session_id}")]
    SessionNotActive { session_id: String },

    #[error("session expired: {session_id}")]
    SessionExpired { session_id: String },

    #[error("invalid config: {reason}")]
    ConfigInvalid { reason: String },

    #[error("persistence error: {reason}")]
    PersistenceError { reason: String },
}

/// Raised by `CandleSource` collaborators; distinct from `CoreError` because
/// it crosses the collaborator boundary and the orchestrator may choose to
/// recover from it (see `FetchFailure`'s fallback-to-estimate policy).
#[derive(Debug, Error)]
#[error("candle fetch error: {0}")]
pub struct FetchError(pub String);
