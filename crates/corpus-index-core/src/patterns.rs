//! Static pattern tables.
//!
//! Heuristic classifiers in this crate are expressed as ordered tables of
//! `(pattern, label)` rows compiled once and shared process-wide.

use regex::Regex;

/// Compile a pattern that is a literal in this crate.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Which field of a document a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Name,
    Path,
    Content,
}

/// One row of a classification table.
#[derive(Debug)]
pub(crate) struct Rule {
    pub field: Field,
    pub pattern: Regex,
    pub label: &'static str,
}

impl Rule {
    pub fn new(field: Field, pattern: &str, label: &'static str) -> Self {
        Self {
            field,
            pattern: compile(pattern),
            label,
        }
    }

    pub fn matches(&self, name: &str, path: &str, content: &str) -> bool {
        let haystack = match self.field {
            Field::Name => name,
            Field::Path => path,
            Field::Content => content,
        };
        !haystack.is_empty() && self.pattern.is_match(haystack)
    }
}

/// First matching label in table order.
pub(crate) fn first_label(
    rules: &[Rule],
    name: &str,
    path: &str,
    content: &str,
) -> Option<&'static str> {
    rules
        .iter()
        .find(|r| r.matches(name, path, content))
        .map(|r| r.label)
}

/// Every distinct matching label, in table order.
pub(crate) fn all_labels(rules: &[Rule], name: &str, path: &str, content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for rule in rules {
        if rule.matches(name, path, content) && !out.iter().any(|l| l == rule.label) {
            out.push(rule.label.to_string());
        }
    }
    out
}
