//! Context resolution: which repository, which revision, which code.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use patrol_core::{CodeLocation, ErrorEvent, ErrorRecord, RepositoryContext};

use crate::provider::CodeProvider;
use crate::stack_trace;

/// Context keys the telemetry pipeline uses to carry a revision marker.
const REF_KEYS: [&str; 2] = ["git.commit.sha", "vcs.ref.head.revision"];

fn re_revision() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("revision regex"))
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub default_repository_url: Option<String>,
    /// service.name -> repository URL.
    pub service_repositories: HashMap<String, String>,
    /// Lines of source fetched before and after the target line.
    pub context_lines: u32,
    /// Cap on code locations pulled per event.
    pub max_locations: usize,
    /// Character budget for the assembled snippet blob.
    pub max_context_chars: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_repository_url: None,
            service_repositories: HashMap::new(),
            context_lines: 20,
            max_locations: 4,
            max_context_chars: 12000,
        }
    }
}

/// Turns an error record into a bounded set of code locations and pulls
/// source snippets for them, best-effort.
pub struct ContextResolver {
    config: ResolverConfig,
}

impl ContextResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Repository selection order: explicit event URL, then the
    /// service-name mapping, then the configured default, then none.
    pub fn select_repository(&self, event: &ErrorEvent) -> Option<String> {
        if let Some(url) = &event.repository_url {
            let url = url.trim();
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }

        if let Some(service) = event.error_log.service_name() {
            if let Some(url) = self.config.service_repositories.get(service) {
                return Some(url.clone());
            }
        }

        self.config.default_repository_url.clone()
    }

    /// Revision marker from the record's context map, if one of the
    /// recognized keys holds something that looks like a commit SHA.
    pub fn repository_ref(record: &ErrorRecord) -> Option<String> {
        for key in REF_KEYS {
            if let Some(value) = record.context.get(key) {
                let value = value.trim();
                if re_revision().is_match(value) {
                    return Some(value.to_string());
                }
            }
        }
        None
    }

    /// Ordered, deduplicated code locations: the record's own location
    /// first, then stack-trace frames top to bottom, capped at the
    /// configured maximum.
    pub fn code_locations(&self, record: &ErrorRecord) -> Vec<CodeLocation> {
        let reference = Self::repository_ref(record);

        let mut raw: Vec<(String, Option<u32>)> = Vec::new();
        if let Some(path) = &record.file_path {
            raw.push((path.clone(), record.line_number));
        }
        if let Some(trace) = &record.stack_trace {
            raw.extend(stack_trace::extract_locations(trace));
        }

        let mut seen: Vec<(String, Option<u32>)> = Vec::new();
        let mut locations = Vec::new();

        for (raw_path, line) in raw {
            if raw_path.is_empty() || stack_trace::is_internal_frame(&raw_path) {
                continue;
            }
            let path = stack_trace::normalize_repo_path(&raw_path);
            if path.is_empty() || stack_trace::is_internal_frame(&path) {
                continue;
            }

            let key = (path.clone(), line);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            locations.push(CodeLocation {
                file_path: path,
                line_number: line,
                reference: reference.clone(),
            });

            if locations.len() >= self.config.max_locations {
                break;
            }
        }

        locations
    }

    /// Resolve the repository and assemble the snippet blob.
    ///
    /// Fetch failures for individual locations are logged and skipped;
    /// a context with empty snippets is still returned so analysis can
    /// proceed on the log alone.
    pub async fn resolve(
        &self,
        event: &ErrorEvent,
        code: &dyn CodeProvider,
    ) -> Option<RepositoryContext> {
        let repository_url = self.select_repository(event)?;
        let reference = Self::repository_ref(&event.error_log);
        let locations = self.code_locations(&event.error_log);

        let mut blocks: Vec<String> = Vec::new();
        let mut used = 0usize;

        for location in &locations {
            let snippet = match code
                .fetch_snippet(
                    &repository_url,
                    reference.as_deref(),
                    &location.file_path,
                    location.line_number,
                    self.config.context_lines,
                )
                .await
            {
                Ok(snippet) => snippet,
                Err(err) => {
                    log::warn!(
                        "snippet fetch failed for {}:{}: {err}",
                        location.file_path,
                        location.line_number.unwrap_or(0)
                    );
                    continue;
                }
            };

            let header = match location.line_number {
                Some(line) => format!("[Snippet] {}:{line}", location.file_path),
                None => format!("[Snippet] {}", location.file_path),
            };
            let block = format!("{header}\n{snippet}");

            // Budget whole blocks; only the very first block may be cut
            // mid-snippet when it alone exceeds the budget.
            let cost = block.len() + if blocks.is_empty() { 0 } else { 2 };
            if used + cost > self.config.max_context_chars {
                if blocks.is_empty() {
                    let truncated: String =
                        block.chars().take(self.config.max_context_chars).collect();
                    blocks.push(truncated);
                }
                break;
            }

            used += cost;
            blocks.push(block);
        }

        Some(RepositoryContext {
            repository_url,
            reference,
            snippets: blocks.join("\n\n"),
        })
    }
}
