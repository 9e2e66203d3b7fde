//! Key-term extraction used for cross-referencing documents.
//!
//! Terms are lowercased and drawn from three sources:
//!
//! - compound identifiers (`snake_case` with at least one underscore, or
//!   `camelCase`/`PascalCase` with an inner case change), at least 4 chars;
//! - file-name-like tokens with a known source or doc extension, plus the
//!   document's own file name;
//! - a fixed technical vocabulary.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::patterns::compile;

const MIN_IDENTIFIER_LEN: usize = 4;

const TECH_VOCABULARY: &[&str] = &[
    "api", "auth", "authentication", "cache", "database", "deployment", "docker", "endpoint",
    "graphql", "grpc", "http", "kafka", "kubernetes", "migration", "oauth", "postgres", "redis",
    "rest", "schema", "sql", "webhook", "websocket",
];

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"[A-Za-z_][A-Za-z0-9_]*"))
}

fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?i)[A-Za-z0-9_./-]+\.(?:rs|py|js|jsx|ts|tsx|go|java|rb|kt|swift|c|cc|cpp|h|hpp|cs|php|md|rst|yaml|yml|toml|json|sql|sh)\b")
    })
}

fn is_compound_identifier(word: &str) -> bool {
    if word.chars().count() < MIN_IDENTIFIER_LEN {
        return false;
    }
    let trimmed = word.trim_matches('_');
    if trimmed.contains('_') {
        return trimmed.split('_').filter(|p| !p.is_empty()).count() >= 2;
    }
    let chars: Vec<char> = trimmed.chars().collect();
    chars
        .windows(2)
        .any(|w| w[0].is_ascii_lowercase() && w[1].is_ascii_uppercase())
}

/// File name portion of a path-like token.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extract the set of key terms from document content and its path.
pub fn extract_terms(content: &str, file_path: Option<&str>) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();

    for m in identifier_re().find_iter(content) {
        let word = m.as_str();
        if is_compound_identifier(word) {
            terms.insert(word.to_lowercase());
        }
    }

    for m in file_re().find_iter(content) {
        let token = m.as_str().trim_start_matches("./").to_lowercase();
        terms.insert(file_name(&token).to_string());
    }

    if let Some(path) = file_path.filter(|p| !p.trim().is_empty()) {
        terms.insert(file_name(path.trim()).to_lowercase());
    }

    let lowered = content.to_lowercase();
    for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        if TECH_VOCABULARY.binary_search(&word).is_ok() {
            terms.insert(word.to_string());
        }
    }

    terms
}
