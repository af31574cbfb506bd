//! Cache-aside analysis orchestration.
//!
//! The engine turns an error event into an [`AnalysisResult`] while
//! minimizing redundant provider calls: fingerprint the record, check the
//! shared cache, and only on a miss resolve repository context and invoke
//! the analysis capability. Concurrent misses for the same key share one
//! in-flight analysis instead of issuing duplicates.

pub mod context;
pub mod provider;
pub mod stack_trace;

pub use context::{ContextResolver, ResolverConfig};
pub use provider::{AnalysisProvider, CodeProvider};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;

use patrol_cache::{fingerprint, AnalysisCache, CacheStats, ErrorFingerprint};
use patrol_core::{clamp_confidence, AnalysisResult, ErrorEvent, PatrolError};

type Outcome = Result<AnalysisResult, PatrolError>;
type InflightMap = Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>;

/// Per-call knobs for [`AnalysisEngine::process_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingOptions {
    /// Bypass both the cache lookup and the write-back, forcing a fresh
    /// analysis.
    pub skip_cache: bool,
}

/// The orchestrator. Construct once per process with an injected cache
/// and providers; it is safe to call from many tasks concurrently.
pub struct AnalysisEngine {
    cache: Arc<AnalysisCache>,
    analysis: Arc<dyn AnalysisProvider>,
    code: Arc<dyn CodeProvider>,
    resolver: ContextResolver,
    inflight: InflightMap,
}

/// Removes the in-flight registration when the owning call finishes, even
/// if it is cancelled mid-analysis.
struct InflightGuard<'a> {
    map: &'a InflightMap,
    key: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

impl AnalysisEngine {
    pub fn new(
        cache: Arc<AnalysisCache>,
        analysis: Arc<dyn AnalysisProvider>,
        code: Arc<dyn CodeProvider>,
        resolver_config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            analysis,
            code,
            resolver: ContextResolver::new(resolver_config),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn process(&self, event: &ErrorEvent) -> Outcome {
        self.process_with_options(event, ProcessingOptions::default())
            .await
    }

    pub async fn process_with_options(
        &self,
        event: &ErrorEvent,
        options: ProcessingOptions,
    ) -> Outcome {
        let record = &event.error_log;
        if !record.is_usable() {
            return Err(PatrolError::InvalidInput(format!(
                "event {} carries no usable error record",
                event.event_id
            )));
        }

        let fp = fingerprint(record);
        let repository = self.resolver.select_repository(event);
        let reference = ContextResolver::repository_ref(record);
        let cache_key = cache_key(&fp, repository.as_deref(), reference.as_deref());

        log::info!("processing event {} ({})", event.event_id, fp.short());

        if !options.skip_cache {
            if let Some(cached) = self.cache.get(&cache_key) {
                log::info!("cache hit for {}", fp.short());
                return Ok(cached);
            }
        }

        enum Flight {
            Owner(watch::Sender<Option<Outcome>>),
            Waiter(watch::Receiver<Option<Outcome>>),
        }

        let flight = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.get(&cache_key) {
                Some(rx) => Flight::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(cache_key.clone(), rx);
                    Flight::Owner(tx)
                }
            }
        };

        let tx = match flight {
            Flight::Waiter(mut rx) => {
                log::debug!("waiting for in-flight analysis of {}", fp.short());
                loop {
                    if let Some(outcome) = rx.borrow_and_update().clone() {
                        return outcome;
                    }
                    if rx.changed().await.is_err() {
                        return Err(PatrolError::AnalysisFailure(
                            "in-flight analysis was abandoned".to_string(),
                        ));
                    }
                }
            }
            Flight::Owner(tx) => tx,
        };

        let _guard = InflightGuard {
            map: &self.inflight,
            key: cache_key.clone(),
        };
        let outcome = self.analyze_uncached(event, &fp, &cache_key, options).await;
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    async fn analyze_uncached(
        &self,
        event: &ErrorEvent,
        fp: &ErrorFingerprint,
        cache_key: &str,
        options: ProcessingOptions,
    ) -> Outcome {
        // Best-effort: a missing repository or failed fetches degrade the
        // prompt, they never abort the event.
        let context = self.resolver.resolve(event, self.code.as_ref()).await;
        if let Some(ctx) = &context {
            log::debug!(
                "resolved context from {} ({} chars)",
                ctx.repository_url,
                ctx.snippets.len()
            );
        }

        let diagnosis = self
            .analysis
            .analyze(&event.error_log, context.as_ref())
            .await?;

        let result = AnalysisResult {
            fingerprint: fp.to_string(),
            root_cause: diagnosis.root_cause,
            suggested_fix: diagnosis.suggested_fix,
            confidence_score: clamp_confidence(diagnosis.confidence_score),
            analyzed_at: Utc::now().timestamp_millis(),
            event_id: event.event_id.clone(),
        };

        if !options.skip_cache {
            self.cache.put(cache_key, result.clone());
        }

        log::info!(
            "analysis complete for {} (confidence: {}%)",
            fp.short(),
            result.confidence_score
        );
        Ok(result)
    }

    /// Process events independently, preserving input order. One event's
    /// failure never aborts its siblings; an empty input yields an empty
    /// list.
    pub async fn process_batch(&self, events: &[ErrorEvent]) -> Vec<Outcome> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            let outcome = self.process(event).await;
            if let Err(err) = &outcome {
                log::warn!("batch item {} failed: {err}", event.event_id);
            }
            results.push(outcome);
        }
        results
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Scope cached analyses to the repository and revision they were made
/// against; the same error against another repo is a different analysis.
fn cache_key(fp: &ErrorFingerprint, repository: Option<&str>, reference: Option<&str>) -> String {
    match repository {
        Some(repo) => format!("analysis:{repo}:{}:{fp}", reference.unwrap_or("default")),
        None => format!("analysis:{fp}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patrol_cache::CacheConfig;
    use patrol_core::{Diagnosis, ErrorRecord, RepositoryContext};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockAnalysis {
        calls: AtomicUsize,
        fail_from_call: Option<usize>,
        fail_on_marker: Option<String>,
        delay: Option<Duration>,
        saw_context: AtomicBool,
    }

    #[async_trait]
    impl AnalysisProvider for MockAnalysis {
        async fn analyze(
            &self,
            record: &ErrorRecord,
            context: Option<&RepositoryContext>,
        ) -> Result<Diagnosis, PatrolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if context.is_some() {
                self.saw_context.store(true, Ordering::SeqCst);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(from) = self.fail_from_call {
                if call >= from {
                    return Err(PatrolError::AnalysisFailure("mock failure".to_string()));
                }
            }
            if let Some(marker) = &self.fail_on_marker {
                if record.message.contains(marker) {
                    return Err(PatrolError::AnalysisFailure("mock failure".to_string()));
                }
            }
            Ok(Diagnosis {
                root_cause: format!("root cause #{call}"),
                suggested_fix: "apply the fix".to_string(),
                confidence_score: 85,
            })
        }
    }

    struct MockCode {
        fail: bool,
    }

    #[async_trait]
    impl CodeProvider for MockCode {
        async fn fetch_snippet(
            &self,
            _repository_url: &str,
            _reference: Option<&str>,
            _file_path: &str,
            _line_number: Option<u32>,
            _context_lines: u32,
        ) -> Result<String, PatrolError> {
            if self.fail {
                Err(PatrolError::ContextUnavailable("503".to_string()))
            } else {
                Ok("10 | let x = y;".to_string())
            }
        }
    }

    fn event(id: &str, message: &str) -> ErrorEvent {
        ErrorEvent {
            event_id: id.to_string(),
            timestamp: 1707817200000,
            error_log: ErrorRecord {
                message: message.to_string(),
                code: None,
                file_path: Some("a.ts".to_string()),
                line_number: Some(10),
                stack_trace: None,
                context: HashMap::new(),
                timestamp: 1707817200000,
            },
            repository_url: None,
        }
    }

    fn engine_with(
        analysis: MockAnalysis,
        code_fails: bool,
        resolver_config: ResolverConfig,
    ) -> (AnalysisEngine, Arc<MockAnalysis>) {
        let analysis = Arc::new(analysis);
        let engine = AnalysisEngine::new(
            Arc::new(AnalysisCache::new(CacheConfig::default())),
            Arc::clone(&analysis) as Arc<dyn AnalysisProvider>,
            Arc::new(MockCode { fail: code_fails }),
            resolver_config,
        );
        (engine, analysis)
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let (engine, analysis) = engine_with(
            MockAnalysis {
                fail_from_call: Some(2),
                ..MockAnalysis::default()
            },
            false,
            ResolverConfig::default(),
        );

        let e = event("evt-1", "TypeError: x is undefined");
        let first = engine.process(&e).await.unwrap();
        let second = engine.process(&e).await.unwrap();

        assert_eq!(analysis.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.root_cause, first.root_cause);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (engine, analysis) = engine_with(
            MockAnalysis {
                fail_on_marker: Some("boom".to_string()),
                ..MockAnalysis::default()
            },
            false,
            ResolverConfig::default(),
        );

        let events = vec![
            event("evt-1", "TypeError: x is undefined"),
            event("evt-2", "boom: broker unreachable"),
            event("evt-3", "ReferenceError: y is not defined"),
        ];
        let results = engine.process_batch(&events).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(PatrolError::AnalysisFailure(_))
        ));
        assert!(results[2].is_ok());
        assert_eq!(results[0].as_ref().unwrap().event_id, "evt-1");
        assert_eq!(results[2].as_ref().unwrap().event_id, "evt-3");
        assert_eq!(analysis.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty_list() {
        let (engine, _) = engine_with(MockAnalysis::default(), false, ResolverConfig::default());
        assert!(engine.process_batch(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_unusable_event_fails_fast() {
        let (engine, analysis) =
            engine_with(MockAnalysis::default(), false, ResolverConfig::default());

        let bad = event("evt-bad", "   ");
        let outcome = engine.process(&bad).await;

        assert!(matches!(outcome, Err(PatrolError::InvalidInput(_))));
        assert_eq!(analysis.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_cache_forces_reanalysis() {
        let (engine, analysis) =
            engine_with(MockAnalysis::default(), false, ResolverConfig::default());
        let options = ProcessingOptions { skip_cache: true };

        let e = event("evt-1", "TypeError: x is undefined");
        engine.process_with_options(&e, options).await.unwrap();
        engine.process_with_options(&e, options).await.unwrap();

        assert_eq!(analysis.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.cache_stats().writes, 0);
    }

    #[tokio::test]
    async fn test_context_failure_does_not_abort() {
        let (engine, analysis) = engine_with(
            MockAnalysis::default(),
            true,
            ResolverConfig {
                default_repository_url: Some("https://github.com/acme/api".to_string()),
                ..ResolverConfig::default()
            },
        );

        let outcome = engine.process(&event("evt-1", "boom")).await;

        assert!(outcome.is_ok());
        assert!(analysis.saw_context.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_analysis() {
        let (engine, analysis) = engine_with(
            MockAnalysis {
                delay: Some(Duration::from_millis(50)),
                ..MockAnalysis::default()
            },
            false,
            ResolverConfig::default(),
        );

        let e = event("evt-1", "TypeError: x is undefined");
        let (a, b) = tokio::join!(engine.process(&e), engine.process(&e));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(analysis.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().root_cause, b.unwrap().root_cause);
    }

    #[tokio::test]
    async fn test_repository_scopes_the_cache_key() {
        let (engine, analysis) =
            engine_with(MockAnalysis::default(), false, ResolverConfig::default());

        let mut first = event("evt-1", "TypeError: x is undefined");
        first.repository_url = Some("https://github.com/acme/api".to_string());
        let mut second = first.clone();
        second.event_id = "evt-2".to_string();
        second.repository_url = Some("https://github.com/acme/web".to_string());

        engine.process(&first).await.unwrap();
        engine.process(&second).await.unwrap();

        assert_eq!(analysis.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.cache_stats().hits, 0);
    }

    #[test]
    fn test_cache_key_shapes() {
        let fp = fingerprint(&event("e", "boom").error_log);
        let bare = cache_key(&fp, None, None);
        assert_eq!(bare, format!("analysis:{fp}"));

        let scoped = cache_key(&fp, Some("https://github.com/acme/api"), Some("deadbeef"));
        assert_eq!(
            scoped,
            format!("analysis:https://github.com/acme/api:deadbeef:{fp}")
        );

        let default_ref = cache_key(&fp, Some("https://github.com/acme/api"), None);
        assert!(default_ref.contains(":default:"));
    }
}
