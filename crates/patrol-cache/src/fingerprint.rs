//! Error fingerprinting: volatile-substring normalization plus a SHA-256
//! digest over a fixed-order composite of the record's identifying fields.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use patrol_core::ErrorRecord;

/// Increment when the normalization rules change, so stale cache entries
/// stop matching.
pub const FINGERPRINT_VERSION: &str = "1";

/// Deterministic identity of "the same error" across occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorFingerprint(String);

impl ErrorFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ErrorFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn re_timestamp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
            .expect("timestamp regex")
    })
}

fn re_uuid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("uuid regex")
    })
}

fn re_hex_addr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").expect("address regex"))
}

fn re_single_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'[^']*'").expect("single-quote regex"))
}

fn re_double_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*""#).expect("double-quote regex"))
}

fn re_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("number regex"))
}

fn re_repo_root() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*/(src|lib|app)/").expect("repo root regex"))
}

/// Strip runtime-specific values from an error message so that two
/// occurrences of the same bug collide.
///
/// Ordering matters: timestamps, UUIDs, and addresses must be replaced
/// before the bare-number pass eats their digits.
pub fn normalize_message(message: &str) -> String {
    let normalized = re_timestamp().replace_all(message, "<TS>");
    let normalized = re_uuid().replace_all(&normalized, "<UUID>");
    let normalized = re_hex_addr().replace_all(&normalized, "<ADDR>");
    let normalized = re_single_quoted().replace_all(&normalized, "'<STR>'");
    let normalized = re_double_quoted().replace_all(&normalized, "\"<STR>\"");
    let normalized = re_number().replace_all(&normalized, "<N>");
    normalized.trim().to_string()
}

/// Reduce a file path to a repo-relative form: forward slashes, no
/// machine-specific prefix up to a conventional source root.
fn normalize_file_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    re_repo_root().replace(&path, "").to_string()
}

/// Compute the fingerprint for a record.
///
/// Pure and deterministic; malformed or absent fields normalize to empty
/// components rather than erroring.
pub fn fingerprint(record: &ErrorRecord) -> ErrorFingerprint {
    let code = record.code.as_deref().unwrap_or("");
    let message = normalize_message(&record.message);
    let file_path = record
        .file_path
        .as_deref()
        .map(normalize_file_path)
        .unwrap_or_default();
    let line = record
        .line_number
        .map(|n| n.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    hasher.update(b"|");
    hasher.update(code.as_bytes());
    hasher.update(b"|");
    hasher.update(message.as_bytes());
    hasher.update(b"|");
    hasher.update(file_path.as_bytes());
    hasher.update(b"|");
    hasher.update(line.as_bytes());

    ErrorFingerprint(format!("{:x}", hasher.finalize()))
}
