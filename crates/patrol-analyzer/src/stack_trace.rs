//! File/line extraction from free-text stack traces.
//!
//! The matching rules are language-specific heuristics; they live here so
//! they can change without touching orchestration logic.

use std::sync::OnceLock;

use regex::Regex;

const SOURCE_EXTS: &str = "py|js|jsx|ts|tsx|java|go|rb|php|cs|c|cc|cpp|h|hpp|rs";

fn re_paren_frame() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Node/JS style: "at getUserById (src/handlers/user.ts:45:15)"
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\((?P<path>[^()\s]+?\.(?:{SOURCE_EXTS})):(?P<line>\d+)(?::\d+)?\)"
        ))
        .expect("paren frame regex")
    })
}

fn re_bare_frame() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "at src/handlers/user.ts:45:15" or a plain "path.go:120"
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?P<path>[^\s()]+?\.(?:{SOURCE_EXTS})):(?P<line>\d+)"
        ))
        .expect("bare frame regex")
    })
}

fn re_python_frame() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Python style: File "app/worker.py", line 88
    RE.get_or_init(|| {
        Regex::new(r#"File ["'](?P<path>[^"']+?\.py)["'], line (?P<line>\d+)"#)
            .expect("python frame regex")
    })
}

fn re_repo_root() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|/)(?P<root>src|lib|app|apps|packages|services|modules)/(?P<rest>.+)$")
            .expect("repo root regex")
    })
}

fn re_drive_letter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]:").expect("drive letter regex"))
}

/// Pull `(path, line)` pairs from a stack trace, pattern by pattern in
/// order of specificity. Duplicates are the caller's concern.
pub fn extract_locations(stack_trace: &str) -> Vec<(String, Option<u32>)> {
    let mut locations = Vec::new();

    for pattern in [re_paren_frame(), re_bare_frame(), re_python_frame()] {
        for captures in pattern.captures_iter(stack_trace) {
            let path = captures
                .name("path")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if path.is_empty() {
                continue;
            }
            let line = captures
                .name("line")
                .and_then(|m| m.as_str().parse::<u32>().ok());
            locations.push((path, line));
        }
    }

    locations
}

/// Frames that point into a runtime rather than the repository.
pub fn is_internal_frame(path: &str) -> bool {
    path.starts_with('<') || path.starts_with("node:") || path.starts_with("internal/")
}

/// Reduce a raw frame path to a repo-relative form: forward slashes, no
/// drive letter, and the suffix starting at a conventional source root
/// when one is present.
pub fn normalize_repo_path(path: &str) -> String {
    let p = path.replace('\\', "/");
    let p = re_drive_letter().replace(&p, "").to_string();

    if let Some(captures) = re_repo_root().captures(&p) {
        return format!("{}/{}", &captures["root"], &captures["rest"]);
    }

    p.trim_start_matches('/').to_string()
}
