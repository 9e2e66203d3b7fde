//! Immutable corpus-wide index built in the first analysis phase.
//!
//! Documents are addressed by their position in the analyzed batch. The
//! index is never mutated after [`CorpusIndex::build`], so the annotation
//! phase sees the same view for every document.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use super::terms::{extract_terms, file_name};
use crate::models::{Document, DocumentId};

#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    doc_ids: Vec<DocumentId>,
    terms: Vec<BTreeSet<String>>,
    term_index: HashMap<String, Vec<usize>>,
    file_index: HashMap<String, Vec<usize>>,
    timestamp_index: BTreeMap<NaiveDate, Vec<usize>>,
}

impl CorpusIndex {
    pub fn build(documents: &[Document]) -> Self {
        let mut index = CorpusIndex::default();

        for (pos, doc) in documents.iter().enumerate() {
            let terms = extract_terms(&doc.content, doc.metadata.file_path.as_deref());
            for term in &terms {
                index.term_index.entry(term.clone()).or_default().push(pos);
            }
            if let Some(path) = doc.metadata.file_path.as_deref() {
                index
                    .file_index
                    .entry(file_name(path).to_lowercase())
                    .or_default()
                    .push(pos);
            }
            if let Some(at) = doc.metadata.last_touched() {
                index
                    .timestamp_index
                    .entry(at.date_naive())
                    .or_default()
                    .push(pos);
            }
            index.doc_ids.push(doc.id());
            index.terms.push(terms);
        }

        index
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn doc_id(&self, pos: usize) -> &str {
        &self.doc_ids[pos]
    }

    pub fn terms_of(&self, pos: usize) -> &BTreeSet<String> {
        &self.terms[pos]
    }

    pub fn documents_with_term(&self, term: &str) -> &[usize] {
        self.term_index.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Documents whose own file name matches `name` (case-insensitive).
    pub fn documents_for_file(&self, name: &str) -> &[usize] {
        self.file_index
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Documents last touched within `[from, to]`.
    pub fn documents_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<usize> {
        self.timestamp_index
            .range(from..=to)
            .flat_map(|(_, v)| v.iter().copied())
            .collect()
    }

    /// Mean number of *other* documents sharing each of this document's terms.
    pub fn cross_reference_density(&self, pos: usize) -> f64 {
        let terms = &self.terms[pos];
        if terms.is_empty() {
            return 0.0;
        }
        let total: usize = terms
            .iter()
            .map(|t| self.documents_with_term(t).iter().filter(|&&p| p != pos).count())
            .sum();
        total as f64 / terms.len() as f64
    }

    /// Other documents sharing at least `min_shared` terms with `pos`,
    /// ordered by shared-term count (descending) then batch position.
    pub fn related(&self, pos: usize, min_shared: usize) -> Vec<(usize, usize)> {
        let mut shared: BTreeMap<usize, usize> = BTreeMap::new();
        for term in &self.terms[pos] {
            for &other in self.documents_with_term(term) {
                if other != pos {
                    *shared.entry(other).or_default() += 1;
                }
            }
        }
        let mut out: Vec<(usize, usize)> = shared
            .into_iter()
            .filter(|(_, n)| *n >= min_shared.max(1))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    pub fn shared_terms(&self, a: usize, b: usize) -> Vec<&str> {
        self.terms[a]
            .intersection(&self.terms[b])
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "fn calculate_invoice_total() { apply_tax_rate(); }",
                SourceType::Code,
                "acme",
            )
            .with_path("src/invoice.rs"),
            Document::new(
                "calculate_invoice_total is wrong in invoice.rs, apply_tax_rate rounds early",
                SourceType::Conversation,
                "acme",
            )
            .with_name("billing-thread"),
            Document::new("unrelated_helper_fn only", SourceType::Code, "acme").with_path("src/x.rs"),
        ]
    }

    #[test]
    fn test_term_index_and_files() {
        let idx = CorpusIndex::build(&corpus());
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.documents_with_term("calculate_invoice_total"), &[0, 1]);
        assert_eq!(idx.documents_with_term("invoice.rs"), &[0, 1]);
        assert_eq!(idx.documents_for_file("INVOICE.rs"), &[0]);
        assert_eq!(idx.doc_id(1), "billing-thread");
    }

    #[test]
    fn test_related_excludes_self() {
        let idx = CorpusIndex::build(&corpus());
        let related = idx.related(0, 2);
        assert_eq!(related, vec![(1, 3)]);
        assert!(idx.related(2, 1).is_empty());
    }

    #[test]
    fn test_cross_reference_density() {
        let idx = CorpusIndex::build(&corpus());
        assert!((idx.cross_reference_density(0) - 1.0).abs() < 1e-9);
        assert_eq!(idx.cross_reference_density(2), 0.0);
    }

    #[test]
    fn test_timestamp_range() {
        let at = chrono::Utc::now();
        let docs = vec![Document::new("a", SourceType::Code, "acme").with_modified_at(at)];
        let idx = CorpusIndex::build(&docs);
        let day = at.date_naive();
        assert_eq!(idx.documents_between(day, day), vec![0]);
    }
}
