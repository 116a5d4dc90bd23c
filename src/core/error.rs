//! Fetch-error taxonomy shared by adapters and the fallback orchestrator.

use thiserror::Error;

use super::model::SourceKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The upstream did not answer within the adapter's timeout.
    #[error("request timed out")]
    Timeout,

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The request failed below HTTP (connect, TLS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The payload did not have the expected shape.
    #[error("unexpected payload: {0}")]
    Parse(String),

    /// The adapter needs a credential that is not configured.
    #[error("missing credential: {0}")]
    Unconfigured(&'static str),

    /// The source's circuit is open after repeated failures.
    #[error("circuit open")]
    CircuitOpen,
}

impl FetchError {
    pub fn parse(message: impl Into<String>) -> Self {
        FetchError::Parse(message.into())
    }
}

/// One failed attempt against one source, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub source: &'static str,
    pub kind: SourceKind,
    pub code: String,
    pub error: FetchError,
}

/// Every enabled source failed (or none was enabled). Carries the failures
/// in attempt order; the only fetch error that crosses the orchestrator.
#[derive(Debug, Error)]
#[error("all {kind} sources exhausted for {code}")]
pub struct SourcesExhausted {
    pub kind: SourceKind,
    pub code: String,
    pub attempts: Vec<FetchFailure>,
}
