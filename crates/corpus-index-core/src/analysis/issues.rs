//! Issue detection.
//!
//! Content detectors are rows of `(type, severity, pattern, suggestion)`;
//! each row reports at most once per document. Source-specific structural
//! checks run afterwards.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::classify::{count_definitions, is_comment_line};
use crate::models::{Document, Issue, IssueType, Severity, SourceType};
use crate::patterns::compile;

/// Documents untouched for longer than this are flagged as stale.
pub const STALE_AFTER_DAYS: i64 = 365;

const MIN_TICKET_LEN: usize = 50;

struct Detector {
    kind: IssueType,
    severity: Severity,
    pattern: Regex,
    suggestion: &'static str,
}

fn detectors() -> &'static [Detector] {
    static TABLE: OnceLock<Vec<Detector>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let row = |kind, severity, pattern: &str, suggestion| Detector {
            kind,
            severity,
            pattern: compile(pattern),
            suggestion,
        };
        vec![
            row(
                IssueType::StaleContent,
                Severity::Medium,
                r"(?i)\b(deprecated|outdated|obsolete|no longer (?:used|maintained|valid)|legacy)\b",
                "Review and update or archive this content",
            ),
            row(
                IssueType::BrokenLinks,
                Severity::Medium,
                r"\[[^\]]+\]\(\s*(?:#?\s*)?\)|\]\((?:TODO|TBD|broken)\)|(?i)\b404\b|\bdead link\b",
                "Fix or remove links without a valid target",
            ),
            row(
                IssueType::VersionMismatch,
                Severity::High,
                r"(?i)version mismatch|incompatible with (?:version|v?\d)|requires? (?:version|v)\s*\d+[^\n]*but",
                "Align referenced versions across related sources",
            ),
            row(
                IssueType::IncompleteImplementation,
                Severity::Medium,
                r"\b(TODO|FIXME|XXX|HACK)\b|unimplemented!|todo!\(|raise NotImplementedError",
                "Finish or track the incomplete work",
            ),
            row(
                IssueType::SecurityRisk,
                Severity::High,
                r#"(?i)\b(password|passwd|secret|api[_-]?key|access[_-]?token|private[_-]?key)\b\s*[:=]\s*["'][^"'\s]{4,}["']|AKIA[0-9A-Z]{16}|-----BEGIN (?:RSA |EC )?PRIVATE KEY-----"#,
                "Remove hardcoded credentials and rotate them",
            ),
        ]
    })
}

/// Detect issues in one document. `now` anchors the staleness check.
pub fn detect_issues(doc: &Document, now: DateTime<Utc>) -> Vec<Issue> {
    let content = doc.content.as_str();
    let mut issues: Vec<Issue> = Vec::new();

    for d in detectors() {
        if let Some(m) = d.pattern.find(content) {
            issues.push(Issue {
                kind: d.kind,
                severity: d.severity,
                description: format!("found '{}'", m.as_str().trim()),
                suggestion: d.suggestion.to_string(),
            });
        }
    }

    if let Some(at) = doc.metadata.last_touched() {
        let age = (now - at).num_days();
        if age > STALE_AFTER_DAYS && !issues.iter().any(|i| i.kind == IssueType::StaleContent) {
            issues.push(Issue {
                kind: IssueType::StaleContent,
                severity: Severity::Low,
                description: format!("not updated in {} days", age),
                suggestion: "Confirm the content is still accurate".to_string(),
            });
        }
    }

    match doc.source_type() {
        SourceType::Code => {
            let described = doc
                .metadata
                .description
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            let commented = content.lines().any(is_comment_line);
            if count_definitions(content) > 0 && !described && !commented {
                issues.push(Issue {
                    kind: IssueType::MissingDocumentation,
                    severity: Severity::Low,
                    description: "definitions without description or comments".to_string(),
                    suggestion: "Add doc comments or a description".to_string(),
                });
            }
        }
        t if t.is_ticket_like() => {
            if content.trim().chars().count() < MIN_TICKET_LEN {
                issues.push(Issue {
                    kind: IssueType::MissingDocumentation,
                    severity: Severity::Low,
                    description: "ticket text is too short to act on".to_string(),
                    suggestion: "Describe context, expected and actual behavior".to_string(),
                });
            }
        }
        _ => {}
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn kinds(issues: &[Issue]) -> Vec<IssueType> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_todo_is_incomplete_medium() {
        let doc = Document::new("Steps: TODO write this", SourceType::Documentation, "acme");
        let issues = detect_issues(&doc, Utc::now());
        assert_eq!(kinds(&issues), vec![IssueType::IncompleteImplementation]);
        assert_eq!(issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_hardcoded_secret_is_high() {
        let doc = Document::new(
            "const API_KEY = \"sk-live-abcdef123456\";\n// config",
            SourceType::Code,
            "acme",
        );
        let issues = detect_issues(&doc, Utc::now());
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueType::SecurityRisk && i.severity == Severity::High));
    }

    #[test]
    fn test_code_missing_docs() {
        let doc = Document::new("fn add(a: i32) -> i32 { a }", SourceType::Code, "acme");
        let issues = detect_issues(&doc, Utc::now());
        assert_eq!(kinds(&issues), vec![IssueType::MissingDocumentation]);
        assert_eq!(issues[0].severity, Severity::Low);
    }

    #[test]
    fn test_short_ticket() {
        let doc = Document::new("Login broken", SourceType::Ticket, "acme");
        let issues = detect_issues(&doc, Utc::now());
        assert_eq!(kinds(&issues), vec![IssueType::MissingDocumentation]);
    }

    #[test]
    fn test_age_based_staleness() {
        let now = Utc::now();
        let doc = Document::new("plain notes", SourceType::Documentation, "acme")
            .with_modified_at(now - Duration::days(400));
        let issues = detect_issues(&doc, now);
        assert_eq!(kinds(&issues), vec![IssueType::StaleContent]);
        assert_eq!(issues[0].severity, Severity::Low);
    }

    #[test]
    fn test_clean_document() {
        let doc = Document::new("A tidy page about deployments.", SourceType::Documentation, "acme");
        assert!(detect_issues(&doc, Utc::now()).is_empty());
    }
}
