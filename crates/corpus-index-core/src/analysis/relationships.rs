//! Relationship inference between documents of one batch.
//!
//! A relationship type applies to a document when any of its cue patterns
//! matches the content. Targets are the other documents that share at least
//! [`MIN_SHARED_TERMS`] key terms, strongest overlap first.

use std::sync::OnceLock;

use regex::Regex;

use super::index::CorpusIndex;
use crate::models::{Relationship, RelationshipType};
use crate::patterns::compile;

pub const MIN_SHARED_TERMS: usize = 2;
pub const MAX_TARGETS_PER_TYPE: usize = 5;
pub const MAX_RELATIONSHIPS: usize = 10;

fn cue_table() -> &'static [(RelationshipType, Regex)] {
    static TABLE: OnceLock<Vec<(RelationshipType, Regex)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            (
                RelationshipType::Supports,
                compile(r"(?i)\b(supports?|confirms?|consistent with|as described in|implements?)\b"),
            ),
            (
                RelationshipType::Extends,
                compile(r"(?i)\b(extends?|builds? on|in addition to|enhances?|follow[- ]up to)\b|\bimpl\s+\w+\s+for\b"),
            ),
            (
                RelationshipType::Explains,
                compile(r"(?i)\b(explains?|describes?|overview of|how to|this (?:module|function|guide) (?:is|does))\b"),
            ),
            (
                RelationshipType::Tests,
                compile(r"(?i)#\[(?:tokio::)?test\]|\bdef test_|\bassert(?:_eq)?!?\s*\(|\b(?:unit|integration) tests?\b|\bdescribe\("),
            ),
            (
                RelationshipType::Contradicts,
                compile(r"(?i)\b(contradicts?|conflicts? with|is wrong|incorrect|no longer|however|actually|instead of)\b"),
            ),
            (
                RelationshipType::References,
                compile(r"(?i)\b(see|refer(?:s|ence)? to|mentioned in|related to|cf\.)\b|\[[^\]]+\]\([^)]+\)"),
            ),
        ]
    })
}

/// Infer outgoing relationships for the document at `pos`.
pub fn infer_relationships(pos: usize, content: &str, index: &CorpusIndex) -> Vec<Relationship> {
    let related = index.related(pos, MIN_SHARED_TERMS);
    if related.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (kind, cue) in cue_table() {
        let Some(m) = cue.find(content) else {
            continue;
        };
        for &(target, shared) in related.iter().take(MAX_TARGETS_PER_TYPE) {
            if out.len() >= MAX_RELATIONSHIPS {
                return out;
            }
            let terms = index.shared_terms(pos, target);
            let sample: Vec<&str> = terms.iter().take(3).copied().collect();
            out.push(Relationship {
                kind: *kind,
                target: index.doc_id(target).to_string(),
                confidence: kind.confidence(),
                evidence: format!(
                    "cue '{}' with {} shared terms ({})",
                    m.as_str(),
                    shared,
                    sample.join(", ")
                ),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, SourceType};

    fn docs() -> Vec<Document> {
        vec![
            Document::new(
                "#[test]\nfn checks_total() { assert_eq!(calculate_invoice_total(), 3); apply_tax_rate(); }",
                SourceType::Code,
                "acme",
            )
            .with_path("tests/invoice_test.rs"),
            Document::new(
                "pub fn calculate_invoice_total() -> u64 { apply_tax_rate() }",
                SourceType::Code,
                "acme",
            )
            .with_path("src/invoice.rs"),
            Document::new("nothing shared here at all", SourceType::Documentation, "acme"),
        ]
    }

    #[test]
    fn test_tests_relationship_found() {
        let docs = docs();
        let idx = CorpusIndex::build(&docs);
        let rels = infer_relationships(0, &docs[0].content, &idx);
        let tests: Vec<_> = rels.iter().filter(|r| r.kind == RelationshipType::Tests).collect();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].target, "src/invoice.rs");
        assert_eq!(tests[0].confidence, 0.9);
    }

    #[test]
    fn test_no_self_or_unrelated_targets() {
        let docs = docs();
        let idx = CorpusIndex::build(&docs);
        for pos in 0..docs.len() {
            for rel in infer_relationships(pos, &docs[pos].content, &idx) {
                assert_ne!(rel.target, idx.doc_id(pos));
                assert_ne!(rel.target, idx.doc_id(2));
            }
        }
    }

    #[test]
    fn test_relationship_cap() {
        let shared = "alpha_term beta_term gamma_term";
        let mut docs: Vec<Document> = (0..12)
            .map(|i| {
                Document::new(format!("{shared} doc_{i}"), SourceType::Documentation, "acme")
                    .with_name(format!("d{i}"))
            })
            .collect();
        docs[0].content = format!("{shared} see also: this describes and extends and supports the rest");
        let idx = CorpusIndex::build(&docs);
        let rels = infer_relationships(0, &docs[0].content, &idx);
        assert_eq!(rels.len(), MAX_RELATIONSHIPS);
    }
}
