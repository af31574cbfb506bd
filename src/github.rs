use std::env;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine as _;
use octocrab::Octocrab;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use patrol_analyzer::CodeProvider;
use patrol_core::PatrolError;

/// Fetches source snippets from GitHub-hosted repositories via the
/// contents API.
pub struct GitHubCodeProvider {
    client: Octocrab,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    encoding: Option<String>,
}

fn re_repository_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Supports https://github.com/owner/repo and git@github.com:owner/repo.git
    RE.get_or_init(|| {
        Regex::new(r"github\.com[:/]([^/]+)/([^/]+?)(?:\.git)?/?$").expect("repository url regex")
    })
}

impl GitHubCodeProvider {
    /// Create a new provider, authenticating with `GITHUB_TOKEN` when set.
    pub fn new() -> Result<Self> {
        let mut builder = Octocrab::builder();

        if let Ok(token) = env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                builder = builder.personal_token(token);
            }
        }

        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to create GitHub client: {}", e))?;

        Ok(Self { client })
    }

    pub fn parse_repository_url(url: &str) -> Option<(String, String)> {
        re_repository_url()
            .captures(url)
            .map(|captures| (captures[1].to_string(), captures[2].to_string()))
    }

    async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        file_path: &str,
        reference: Option<&str>,
    ) -> Result<String, PatrolError> {
        let mut route = format!("/repos/{owner}/{repo}/contents/{file_path}");
        if let Some(reference) = reference {
            route = format!("{route}?ref={}", urlencoding::encode(reference));
        }
        debug!("fetching {route}");

        let response: ContentResponse = self
            .client
            .get(route, None::<&()>)
            .await
            .map_err(|e| PatrolError::ContextUnavailable(format!("GitHub API error: {e}")))?;

        if response.kind != "file" {
            return Err(PatrolError::ContextUnavailable(format!(
                "not a file: {file_path}"
            )));
        }

        let payload = response.content.ok_or_else(|| {
            PatrolError::ContextUnavailable(format!("no content for {file_path}"))
        })?;

        if let Some(encoding) = &response.encoding {
            if encoding != "base64" {
                return Err(PatrolError::ContextUnavailable(format!(
                    "unexpected encoding '{encoding}' for {file_path}"
                )));
            }
        }

        // The API wraps base64 payloads across multiple lines.
        let compact: String = payload.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| {
                PatrolError::ContextUnavailable(format!("invalid content payload: {e}"))
            })?;

        String::from_utf8(bytes)
            .map_err(|e| PatrolError::ContextUnavailable(format!("non-UTF-8 file content: {e}")))
    }
}

#[async_trait]
impl CodeProvider for GitHubCodeProvider {
    async fn fetch_snippet(
        &self,
        repository_url: &str,
        reference: Option<&str>,
        file_path: &str,
        line_number: Option<u32>,
        context_lines: u32,
    ) -> Result<String, PatrolError> {
        let (owner, repo) = Self::parse_repository_url(repository_url).ok_or_else(|| {
            PatrolError::ContextUnavailable(format!("invalid repository URL: {repository_url}"))
        })?;

        let content = self
            .fetch_file(&owner, &repo, file_path, reference)
            .await?;

        Ok(extract_window(&content, line_number, context_lines))
    }
}

/// Cut a window of lines around the target, with a numbered gutter.
/// Without a usable line number the window starts at the top of the file.
pub(crate) fn extract_window(content: &str, line_number: Option<u32>, context_lines: u32) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let total = lines.len();
    let (start, end) = match line_number {
        Some(line) if line >= 1 && (line as usize) <= total => {
            let line = line as usize;
            let start = line.saturating_sub(context_lines as usize).max(1);
            let end = (line + context_lines as usize).min(total);
            (start, end)
        }
        _ => (1, total.min((context_lines as usize * 2 + 1).max(40))),
    };

    let width = end.to_string().len();
    (start..=end)
        .map(|i| format!("{:>width$} | {}", i, lines[i - 1], width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
