//! Run-level summary over an analyzed batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Document, IssueType, Severity};

/// Source types averaging below this get a recommendation.
pub const QUALITY_RECOMMENDATION_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub documents: usize,
    pub average_quality: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_documents: usize,
    pub average_quality: f64,
    pub quality_by_source_type: BTreeMap<String, SourceQuality>,
    pub issue_counts: BTreeMap<String, usize>,
    pub severity_counts: BTreeMap<String, usize>,
    pub relationship_counts: BTreeMap<String, usize>,
    pub recommendations: Vec<String>,
}

pub fn summarize(documents: &[Document]) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        total_documents: documents.len(),
        ..Default::default()
    };
    if documents.is_empty() {
        return summary;
    }

    let mut sums: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    let mut total = 0.0;
    let mut docs_with_issue: BTreeMap<IssueType, usize> = BTreeMap::new();
    let mut high_docs = 0;

    for doc in documents {
        let q = doc.quality_score();
        total += q;
        let entry = sums.entry(doc.source_type().to_string()).or_default();
        entry.0 += 1;
        entry.1 += q;

        let Some(integration) = &doc.integration else {
            continue;
        };
        for issue in &integration.issues {
            *summary
                .issue_counts
                .entry(issue.kind.as_str().to_string())
                .or_default() += 1;
            *summary
                .severity_counts
                .entry(issue.severity.as_str().to_string())
                .or_default() += 1;
        }
        let mut kinds: Vec<IssueType> = integration.issues.iter().map(|i| i.kind).collect();
        kinds.sort();
        kinds.dedup();
        for kind in kinds {
            *docs_with_issue.entry(kind).or_default() += 1;
        }
        if integration.issues.iter().any(|i| i.severity == Severity::High) {
            high_docs += 1;
        }
        for rel in &integration.relationships {
            *summary
                .relationship_counts
                .entry(rel.kind.as_str().to_string())
                .or_default() += 1;
        }
    }

    summary.average_quality = total / documents.len() as f64;
    for (source, (n, sum)) in sums {
        let avg = sum / n as f64;
        if avg < QUALITY_RECOMMENDATION_THRESHOLD {
            summary.recommendations.push(format!(
                "average quality for `{}` is below {:.1} ({:.2}); refresh or consolidate these sources",
                source, QUALITY_RECOMMENDATION_THRESHOLD, avg
            ));
        }
        summary.quality_by_source_type.insert(
            source,
            SourceQuality {
                documents: n,
                average_quality: avg,
            },
        );
    }

    if high_docs > 0 {
        summary.recommendations.push(format!(
            "{} document(s) carry high-severity issues and may be excluded from indexing",
            high_docs
        ));
    }
    if let Some(n) = docs_with_issue.get(&IssueType::StaleContent) {
        summary.recommendations.push(format!(
            "{} document(s) look stale; review them for outdated information",
            n
        ));
    }
    if let Some(n) = docs_with_issue.get(&IssueType::MissingDocumentation) {
        summary
            .recommendations
            .push(format!("{} document(s) lack documentation", n));
    }
    if summary.relationship_counts.is_empty() && documents.len() > 1 {
        summary.recommendations.push(
            "no cross-document relationships were inferred; link related artifacts by name or path"
                .to_string(),
        );
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Integration, Issue, SourceType};

    fn with_quality(mut doc: Document, q: f64, issues: Vec<Issue>) -> Document {
        doc.integration = Some(Integration {
            quality_score: q,
            relationships: vec![],
            issues,
            semantic_context: Default::default(),
            breakdown: None,
        });
        doc
    }

    #[test]
    fn test_empty_batch() {
        let s = summarize(&[]);
        assert_eq!(s.total_documents, 0);
        assert!(s.recommendations.is_empty());
    }

    #[test]
    fn test_low_quality_recommendation() {
        let docs = vec![
            with_quality(Document::new("a", SourceType::Documentation, "t"), 0.3, vec![]),
            with_quality(Document::new("b", SourceType::Code, "t"), 0.9, vec![]),
        ];
        let s = summarize(&docs);
        assert!((s.average_quality - 0.6).abs() < 1e-9);
        assert!(s
            .recommendations
            .iter()
            .any(|r| r.starts_with("average quality for `documentation` is below 0.6")));
        assert!(!s.recommendations.iter().any(|r| r.contains("`code`")));
    }

    #[test]
    fn test_issue_and_severity_counts() {
        let issue = Issue {
            kind: IssueType::SecurityRisk,
            severity: Severity::High,
            description: "found key".into(),
            suggestion: "rotate".into(),
        };
        let docs = vec![with_quality(
            Document::new("a", SourceType::Code, "t"),
            0.8,
            vec![issue],
        )];
        let s = summarize(&docs);
        assert_eq!(s.issue_counts.get("security_risk"), Some(&1));
        assert_eq!(s.severity_counts.get("high"), Some(&1));
        assert!(s.recommendations.iter().any(|r| r.contains("high-severity")));
    }
}
