//! Cross-document integration analysis.
//!
//! Analysis runs in two phases over a whole batch:
//!
//! 1. [`Analyzer::index`] builds an immutable [`CorpusIndex`] of key terms,
//!    file names, and timestamps.
//! 2. [`Analyzer::annotate`] scores every document against that index,
//!    attaching an [`Integration`] (quality, relationships, issues, semantic
//!    context) and, where missing, an [`Enrichment`](crate::models::Enrichment).
//!
//! Annotations already supplied by a connector are kept as-is.
//!
//! ```rust
//! use corpus_index_core::analysis::Analyzer;
//! use corpus_index_core::models::{Document, SourceType};
//!
//! let docs = vec![Document::new("fn parse_config() {}", SourceType::Code, "acme")];
//! let outcome = Analyzer::new().analyze(docs);
//! assert!(outcome.documents[0].integration.is_some());
//! assert_eq!(outcome.summary.total_documents, 1);
//! ```

pub mod index;
pub mod issues;
pub mod quality;
pub mod relationships;
pub mod summary;
pub mod terms;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

pub use index::CorpusIndex;
pub use summary::{summarize, AnalysisSummary};

use crate::classify::enrich;
use crate::models::{Document, Integration, QualityBreakdown};
use relationships::{infer_relationships, MIN_SHARED_TERMS};

/// Number of shared terms recorded in `semantic_context`.
const CONTEXT_TERMS: usize = 5;

/// Output of phase one: the batch plus its index.
#[derive(Debug, Clone)]
pub struct IndexedBatch {
    index: CorpusIndex,
    documents: Vec<Document>,
}

impl IndexedBatch {
    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub documents: Vec<Document>,
    pub summary: AnalysisSummary,
}

/// Integration analyzer. The reference time is fixed at construction so a
/// run scores every document against the same clock.
#[derive(Debug, Clone)]
pub struct Analyzer {
    now: DateTime<Utc>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    pub fn with_now(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Phase one.
    pub fn index(&self, documents: Vec<Document>) -> IndexedBatch {
        IndexedBatch {
            index: CorpusIndex::build(&documents),
            documents,
        }
    }

    /// Phase two.
    pub fn annotate(&self, batch: IndexedBatch) -> AnalysisOutcome {
        let IndexedBatch { index, documents } = batch;

        let mut annotations: Vec<Option<Integration>> = Vec::with_capacity(documents.len());
        for (pos, doc) in documents.iter().enumerate() {
            if doc.integration.is_some() {
                annotations.push(None);
                continue;
            }
            annotations.push(Some(self.integrate(pos, doc, &documents, &index)));
        }

        let documents: Vec<Document> = documents
            .into_iter()
            .zip(annotations)
            .map(|(mut doc, integration)| {
                if integration.is_some() {
                    doc.integration = integration;
                }
                if doc.enrichment.is_none() {
                    doc.enrichment = Some(enrich(&doc));
                }
                doc
            })
            .collect();

        let summary = summarize(&documents);
        AnalysisOutcome { documents, summary }
    }

    pub fn analyze(&self, documents: Vec<Document>) -> AnalysisOutcome {
        self.annotate(self.index(documents))
    }

    fn integrate(
        &self,
        pos: usize,
        doc: &Document,
        all: &[Document],
        index: &CorpusIndex,
    ) -> Integration {
        let related = index.related(pos, MIN_SHARED_TERMS);
        let conflicting_neighbors = related
            .iter()
            .filter(|(other, _)| quality::has_version_conflict(&all[*other].content))
            .count();

        let breakdown = QualityBreakdown {
            freshness: quality::freshness_score(doc.metadata.last_touched(), self.now),
            cross_reference: quality::cross_reference_score(index.cross_reference_density(pos)),
            completeness: quality::completeness_score(doc),
            consistency: quality::consistency_score(
                quality::count_issue_markers(&doc.content) + conflicting_neighbors,
            ),
        };

        let mut semantic_context = Map::new();
        let mut shared: Vec<&str> = Vec::new();
        for (other, _) in &related {
            for term in index.shared_terms(pos, *other) {
                if !shared.contains(&term) {
                    shared.push(term);
                }
            }
        }
        shared.truncate(CONTEXT_TERMS);
        semantic_context.insert("key_terms".into(), json!(index.terms_of(pos).len()));
        semantic_context.insert("shared_terms".into(), json!(shared));
        semantic_context.insert("related_documents".into(), json!(related.len()));
        semantic_context.insert(
            "cross_reference_density".into(),
            Value::from(index.cross_reference_density(pos)),
        );

        Integration {
            quality_score: breakdown.score(),
            relationships: infer_relationships(pos, &doc.content, index),
            issues: issues::detect_issues(doc, self.now),
            semantic_context,
            breakdown: Some(breakdown),
        }
    }
}
