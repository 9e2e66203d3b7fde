//! Integration quality scoring.
//!
//! `quality = 0.3 * freshness + 0.3 * cross_reference + 0.2 * completeness
//! + 0.2 * consistency`, clamped to `[0, 1]`.
//!
//! | Component | Input | Buckets |
//! |-----------|-------|---------|
//! | freshness | days since last touch | <30: 0.9, <90: 0.7, <180: 0.4, else 0.2; unknown 0.5 |
//! | cross_reference | mean other-docs per term | >=3: 1.0, >=1: 0.8, >=0.5: 0.6, else 0.3 |
//! | completeness | per-source structural checks | additive, capped at 1.0 |
//! | consistency | issue markers + related conflict markers | 0: 0.9, 1: 0.7, 2-3: 0.4, else 0.2 |

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::classify::{count_definitions, is_comment_line};
use crate::models::{Document, SourceType};
use crate::patterns::compile;

pub const UNKNOWN_FRESHNESS: f64 = 0.5;

fn issue_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?i)\b(TODO|FIXME|XXX|HACK|deprecated|outdated|obsolete|inconsistent|contradicts?|mismatch)\b")
    })
}

fn version_conflict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?i)version mismatch|incompatible with (?:version|v?\d)|breaking change|no longer (?:supported|compatible)|requires? (?:version|v)\s*\d")
    })
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"(?m)^#{1,6}\s+\S"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"\[[^\]]*\]\([^)]*\)|https?://\S+"))
}

fn ticket_structure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?im)steps to reproduce|acceptance criteria|expected (?:behaviou?r|result)|^\s*- \[[ xX]\]|^#{1,6}\s")
    })
}

pub fn freshness_score(last_touched: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(at) = last_touched else {
        return UNKNOWN_FRESHNESS;
    };
    let age_days = (now - at).num_days();
    match age_days {
        d if d < 30 => 0.9,
        d if d < 90 => 0.7,
        d if d < 180 => 0.4,
        _ => 0.2,
    }
}

pub fn cross_reference_score(density: f64) -> f64 {
    if density >= 3.0 {
        1.0
    } else if density >= 1.0 {
        0.8
    } else if density >= 0.5 {
        0.6
    } else {
        0.3
    }
}

pub fn count_issue_markers(content: &str) -> usize {
    issue_marker_re().find_iter(content).count()
}

pub fn has_version_conflict(content: &str) -> bool {
    version_conflict_re().is_match(content)
}

/// `penalty` is the document's own issue markers plus the number of related
/// documents carrying version-conflict markers.
pub fn consistency_score(penalty: usize) -> f64 {
    match penalty {
        0 => 0.9,
        1 => 0.7,
        2 | 3 => 0.4,
        _ => 0.2,
    }
}

/// Speaker of a `name: text` chat line, skipping a leading `[timestamp]`.
fn speaker_of(line: &str) -> Option<&str> {
    let t = line.trim_start();
    let t = match t.strip_prefix('[') {
        Some(rest) => rest.split_once(']').map(|(_, r)| r.trim_start()).unwrap_or(rest),
        None => t,
    };
    let (who, _) = t.split_once(':')?;
    let who = who.trim();
    (!who.is_empty() && who.len() <= 32 && !who.contains(' ')).then_some(who)
}

/// Count of chat messages: lines with a speaker or a leading timestamp,
/// falling back to non-empty lines.
pub fn message_count(content: &str) -> usize {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let marked = lines
        .iter()
        .filter(|l| l.trim_start().starts_with('[') || speaker_of(l).is_some())
        .count();
    if marked > 0 {
        marked
    } else {
        lines.len()
    }
}

pub fn completeness_score(doc: &Document) -> f64 {
    let content = doc.content.as_str();
    let len = content.chars().count();
    let has_description = doc
        .metadata
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty());

    let score: f64 = match doc.source_type() {
        SourceType::Code => {
            let mut s = 0.2;
            if has_description || content.lines().any(|l| l.trim_start().starts_with("///") || l.trim_start().starts_with("\"\"\"")) {
                s += 0.3;
            }
            if len >= 200 {
                s += 0.2;
            }
            if content.lines().any(is_comment_line) {
                s += 0.2;
            }
            if count_definitions(content) > 0 {
                s += 0.1;
            }
            s
        }
        SourceType::Documentation => {
            let mut s = 0.2;
            if len >= 300 {
                s += 0.3;
            }
            if header_re().is_match(content) {
                s += 0.2;
            }
            if content.contains("```") || content.lines().any(|l| l.trim_start().starts_with("- ")) {
                s += 0.15;
            }
            if link_re().is_match(content) {
                s += 0.15;
            }
            s
        }
        SourceType::Conversation => {
            let mut s = 0.3;
            if message_count(content) >= 3 {
                s += 0.3;
            }
            if len >= 200 {
                s += 0.2;
            }
            if speakers(content) >= 2 {
                s += 0.2;
            }
            s
        }
        _ => {
            let mut s = 0.3;
            if len >= 100 {
                s += 0.3;
            }
            if has_description || doc.metadata.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
                s += 0.2;
            }
            if ticket_structure_re().is_match(content) {
                s += 0.2;
            }
            s
        }
    };
    score.min(1.0)
}

fn speakers(content: &str) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for who in content.lines().filter_map(speaker_of) {
        if !seen.contains(&who) {
            seen.push(who);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_freshness_buckets() {
        let now = Utc::now();
        assert_eq!(freshness_score(Some(now - Duration::days(1)), now), 0.9);
        assert_eq!(freshness_score(Some(now - Duration::days(45)), now), 0.7);
        assert_eq!(freshness_score(Some(now - Duration::days(120)), now), 0.4);
        assert_eq!(freshness_score(Some(now - Duration::days(200)), now), 0.2);
        assert_eq!(freshness_score(None, now), UNKNOWN_FRESHNESS);
    }

    #[test]
    fn test_freshness_band_edges() {
        let now = Utc::now();
        let at = |days: i64| freshness_score(Some(now - Duration::days(days)), now);
        assert!(at(29) > at(31));
        assert!(at(91) > at(181));
        assert_eq!(at(29), 0.9);
        assert_eq!(at(30), 0.7);
        assert_eq!(at(89), 0.7);
        assert_eq!(at(90), 0.4);
        assert_eq!(at(179), 0.4);
        assert_eq!(at(180), 0.2);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        assert_eq!(freshness_score(Some(now + Duration::days(3)), now), 0.9);
    }

    #[test]
    fn test_cross_reference_buckets() {
        assert_eq!(cross_reference_score(4.0), 1.0);
        assert_eq!(cross_reference_score(1.0), 0.8);
        assert_eq!(cross_reference_score(0.5), 0.6);
        assert_eq!(cross_reference_score(0.0), 0.3);
    }

    #[test]
    fn test_consistency_buckets() {
        assert_eq!(consistency_score(0), 0.9);
        assert_eq!(consistency_score(1), 0.7);
        assert_eq!(consistency_score(3), 0.4);
        assert_eq!(consistency_score(9), 0.2);
    }

    #[test]
    fn test_issue_markers() {
        assert_eq!(count_issue_markers("TODO: fix. This is deprecated. FIXME"), 3);
        assert_eq!(count_issue_markers("all good here"), 0);
        assert!(has_version_conflict("Note: breaking change in v2"));
    }

    #[test]
    fn test_completeness_documentation() {
        let bare = Document::new("short note", SourceType::Documentation, "acme");
        assert!((completeness_score(&bare) - 0.2).abs() < 1e-9);

        let body = format!(
            "# Billing\n\n{}\n\n- item\n\nSee [guide](https://example.com).",
            "x".repeat(300)
        );
        let rich = Document::new(body, SourceType::Documentation, "acme");
        assert!((completeness_score(&rich) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_completeness_conversation() {
        let doc = Document::new(
            "alice: the export broke\nbob: which one?\nalice: the nightly one",
            SourceType::Conversation,
            "acme",
        );
        assert!((completeness_score(&doc) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_completeness_code_capped() {
        let content = format!("/// Adds numbers.\n// helper\nfn add() {{}}\n{}", "x".repeat(300));
        let doc = Document::new(content, SourceType::Code, "acme").with_description("adds");
        assert!((completeness_score(&doc) - 1.0).abs() < 1e-9);
    }
}
