//! Error taxonomy for the analysis pipeline.

use thiserror::Error;

/// Failure classes surfaced by the engine.
///
/// `ContextUnavailable` is swallowed inside context resolution and only
/// degrades analysis quality; the other variants abort the affected event.
#[derive(Debug, Clone, Error)]
pub enum PatrolError {
    /// The event carried no usable error record.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A code-fetch or repository-resolution step failed.
    #[error("context unavailable: {0}")]
    ContextUnavailable(String),

    /// The external analysis capability failed for this event.
    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    /// A cache invariant was violated; unreachable given a correct store.
    #[error("cache invariant violated: {0}")]
    CacheInvariant(String),
}

impl PatrolError {
    /// Stable identifier used in structured failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PatrolError::InvalidInput(_) => "invalid_input",
            PatrolError::ContextUnavailable(_) => "context_unavailable",
            PatrolError::AnalysisFailure(_) => "analysis_failure",
            PatrolError::CacheInvariant(_) => "cache_invariant",
        }
    }
}
