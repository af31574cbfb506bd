//! Capability seams consumed by the engine.
//!
//! Concrete providers (OpenAI, GitHub) live in the root crate and are
//! injected at engine construction; tests inject mocks.

use async_trait::async_trait;

use patrol_core::{Diagnosis, ErrorRecord, PatrolError, RepositoryContext};

/// Produces an analysis for one error, optionally informed by repository
/// context. Fail-fast: no internal retry, the caller owns retry policy.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(
        &self,
        record: &ErrorRecord,
        context: Option<&RepositoryContext>,
    ) -> Result<Diagnosis, PatrolError>;
}

/// Fetches a source snippet around a line from a hosted repository.
#[async_trait]
pub trait CodeProvider: Send + Sync {
    async fn fetch_snippet(
        &self,
        repository_url: &str,
        reference: Option<&str>,
        file_path: &str,
        line_number: Option<u32>,
        context_lines: u32,
    ) -> Result<String, PatrolError>;
}
