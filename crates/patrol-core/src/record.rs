//! Error record and event types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single normalized error observation.
///
/// Immutable once constructed; all downstream processing works on borrows
/// or clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Free-form key/value context attached by the emitting service.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl ErrorRecord {
    /// A record is usable when it carries at least one identifying field.
    pub fn is_usable(&self) -> bool {
        !self.message.trim().is_empty() || self.code.is_some()
    }

    /// Service identifier from the context map, if the emitter set one.
    pub fn service_name(&self) -> Option<&str> {
        self.context.get("service.name").map(String::as_str)
    }
}

/// An error event as delivered by a trigger adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub event_id: String,
    #[serde(default)]
    pub timestamp: i64,
    pub error_log: ErrorRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
}

/// A (file, line, optional revision) triple identifying where to pull
/// source context from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Resolved repository plus the assembled source snippets for one event.
///
/// `snippets` is empty when every location fetch failed; analysis still
/// proceeds with the repository identity alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContext {
    pub repository_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub snippets: String,
}

impl RepositoryContext {
    pub fn has_snippets(&self) -> bool {
        !self.snippets.is_empty()
    }
}
