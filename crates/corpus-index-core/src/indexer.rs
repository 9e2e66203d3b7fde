//! Document indexing pipeline.
//!
//! [`Indexer::add_documents`] takes a batch of documents for one tenant and
//! one collection category through these stages:
//!
//! 1. **Validate**: the category must be known and the configuration sane
//!    (both fatal); each document must have content and belong to the
//!    calling tenant (per-document failures).
//! 2. **Analyze**: documents without an integration annotation are scored
//!    as a batch by the [`Analyzer`].
//! 3. **Admit**: documents below the quality threshold, or carrying
//!    high-severity issues when that filter is on, are skipped with a reason.
//! 4. **Quota**: documents that would push an organization past
//!    `max_documents` are skipped.
//! 5. **Chunk**: admitted documents are chunked; duplicate ids within the
//!    run are dropped.
//! 6. **Write**: chunks go out in batches. Each batch checks which ids are
//!    already stored, embeds the rest, and upserts them, all under one
//!    timeout. A failed batch is recorded and the run moves on; batches
//!    already written stay written.
//!
//! Re-running the same input is a no-op for the store: every chunk id is
//! already present, so nothing is embedded or written.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisSummary, Analyzer};
use crate::chunk::{chunk_document, ChunkingParams};
use crate::error::{with_timeout, IndexError, Result};
use crate::manager::{Collection, VectorStoreManager};
use crate::models::{Document, DocumentId, Issue};
use crate::record::StorageRecord;
use crate::tenant::{Category, Tenant, TenantId};

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    pub quality_threshold: f64,
    pub filter_high_severity: bool,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    /// Run integration analysis on documents that lack it.
    pub analyze: bool,
    pub chunking: ChunkingParams,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.5,
            filter_high_severity: true,
            batch_size: 100,
            batch_timeout: Duration::from_secs(60),
            analyze: true,
            chunking: ChunkingParams::default(),
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(IndexError::Config(format!(
                "quality_threshold must be within [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if self.batch_size == 0 {
            return Err(IndexError::Config("batch_size must be > 0".into()));
        }
        if self.batch_timeout.is_zero() {
            return Err(IndexError::Config("batch_timeout must be > 0".into()));
        }
        if self.chunking.max_tokens == 0 {
            return Err(IndexError::Config("chunking.max_tokens must be > 0".into()));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(IndexError::Config(format!(
                "chunking.overlap_tokens ({}) must be < max_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.max_tokens
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    LowQuality { score: f64, threshold: f64 },
    HighSeverityIssues { count: usize },
    QuotaExceeded { limit: u64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::LowQuality { score, threshold } => {
                write!(f, "quality {:.2} below threshold {:.2}", score, threshold)
            }
            SkipReason::HighSeverityIssues { count } => {
                write!(f, "{} high-severity issue(s)", count)
            }
            SkipReason::QuotaExceeded { limit } => {
                write!(f, "tenant document quota of {} reached", limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub reason: SkipReason,
    pub quality_score: f64,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: DocumentId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub chunk_count: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub run_id: String,
    pub tenant: String,
    pub collection: String,
    /// True when every batch was written and the run was not cancelled.
    pub success: bool,
    pub cancelled: bool,
    pub documents_received: usize,
    /// Admitted documents whose chunks all reached the store (written or
    /// already present).
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub chunks_skipped_existing: usize,
    pub chunks_failed: usize,
    pub skip_reasons: Vec<SkipRecord>,
    pub failed_documents: Vec<DocumentFailure>,
    pub failed_batches: Vec<BatchFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_summary: Option<AnalysisSummary>,
}

impl IndexReport {
    fn new(tenant: &TenantId, collection: String, received: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            tenant: tenant.as_str().to_string(),
            collection,
            success: false,
            cancelled: false,
            documents_received: received,
            documents_processed: 0,
            documents_skipped: 0,
            chunks_created: 0,
            chunks_skipped_existing: 0,
            chunks_failed: 0,
            skip_reasons: Vec::new(),
            failed_documents: Vec::new(),
            failed_batches: Vec::new(),
            run_summary: None,
        }
    }

    /// Skip counts keyed by reason name.
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skip_reasons {
            let key = match s.reason {
                SkipReason::LowQuality { .. } => "low_quality",
                SkipReason::HighSeverityIssues { .. } => "high_severity_issues",
                SkipReason::QuotaExceeded { .. } => "quota_exceeded",
            };
            *counts.entry(key).or_default() += 1;
        }
        counts
    }
}

/// Admission decision for one analyzed document.
pub fn admit(
    doc: &Document,
    threshold: f64,
    filter_high_severity: bool,
) -> std::result::Result<(), SkipReason> {
    let score = doc.quality_score();
    if score < threshold {
        return Err(SkipReason::LowQuality { score, threshold });
    }
    let high = doc.high_severity_issues();
    if filter_high_severity && high > 0 {
        return Err(SkipReason::HighSeverityIssues { count: high });
    }
    Ok(())
}

/// Ingress contract check for one document.
pub fn validate_document(doc: &Document, tenant: &TenantId) -> Result<()> {
    if doc.content.trim().is_empty() {
        return Err(IndexError::InvalidDocument("content is empty".into()));
    }
    let declared = doc.metadata.tenant_id.trim();
    if declared.is_empty() {
        return Err(IndexError::InvalidDocument("metadata.tenant_id is missing".into()));
    }
    if declared != tenant.as_str() {
        return Err(IndexError::TenantMismatch {
            expected: tenant.as_str().to_string(),
            found: declared.to_string(),
        });
    }
    Ok(())
}

pub struct Indexer {
    manager: Arc<VectorStoreManager>,
    config: IndexerConfig,
    analyzer: Analyzer,
}

impl Indexer {
    pub fn new(manager: Arc<VectorStoreManager>, config: IndexerConfig) -> Self {
        Self {
            manager,
            config,
            analyzer: Analyzer::new(),
        }
    }

    /// Score documents against a fixed clock instead of the wall clock.
    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub async fn add_documents(
        &self,
        tenant: &Tenant,
        documents: Vec<Document>,
        category: &str,
        batch_size: Option<usize>,
    ) -> Result<IndexReport> {
        self.add_documents_with_cancel(tenant, documents, category, batch_size, &CancelFlag::new())
            .await
    }

    pub async fn add_documents_with_cancel(
        &self,
        tenant: &Tenant,
        documents: Vec<Document>,
        category: &str,
        batch_size: Option<usize>,
        cancel: &CancelFlag,
    ) -> Result<IndexReport> {
        self.config.validate()?;
        let category: Category = category.parse()?;
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(IndexError::Config("batch_size must be > 0".into()));
        }

        let tenant_id = &tenant.id;
        let collection = self
            .manager
            .get_or_create_collection(tenant_id, category)
            .await?;
        let mut report = IndexReport::new(tenant_id, collection.name.clone(), documents.len());
        info!(
            run_id = %report.run_id,
            tenant = %tenant_id,
            collection = %collection.name,
            documents = documents.len(),
            "indexing run started"
        );

        let mut valid = Vec::with_capacity(documents.len());
        for doc in documents {
            match validate_document(&doc, tenant_id) {
                Ok(()) => valid.push(doc),
                Err(e) => {
                    warn!(document = %doc.id(), error = %e, "document rejected at ingress");
                    report.failed_documents.push(DocumentFailure {
                        document_id: doc.id(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let analyzed = if self.config.analyze && valid.iter().any(|d| d.integration.is_none()) {
            let outcome = self.analyzer.analyze(valid);
            report.run_summary = Some(outcome.summary);
            outcome.documents
        } else {
            valid
        };

        let mut admitted = Vec::with_capacity(analyzed.len());
        for doc in analyzed {
            match admit(&doc, self.config.quality_threshold, self.config.filter_high_severity) {
                Ok(()) => admitted.push(doc),
                Err(reason) => {
                    let issues = doc
                        .integration
                        .as_ref()
                        .map(|i| i.issues.clone())
                        .unwrap_or_default();
                    let issue_names: Vec<&str> = issues.iter().map(|i| i.kind.as_str()).collect();
                    warn!(
                        document = %doc.id(),
                        score = doc.quality_score(),
                        issues = ?issue_names,
                        reason = %reason,
                        "document skipped"
                    );
                    report.skip_reasons.push(SkipRecord {
                        document_id: doc.id(),
                        reason,
                        quality_score: doc.quality_score(),
                        issues,
                    });
                }
            }
        }

        let admitted = self.apply_quota(tenant, &collection, admitted, &mut report).await?;
        report.documents_skipped = report.skip_reasons.len();

        let records = self.build_records(tenant_id, &collection, &admitted);
        let unwritten = self
            .write_batches(&collection, records, batch_size, cancel, &mut report)
            .await;
        report.documents_processed = admitted
            .iter()
            .filter(|doc| !unwritten.contains(&doc.id()))
            .count();

        report.success = report.failed_batches.is_empty() && !report.cancelled;
        info!(
            run_id = %report.run_id,
            processed = report.documents_processed,
            skipped = report.documents_skipped,
            failed_documents = report.failed_documents.len(),
            chunks_created = report.chunks_created,
            chunks_existing = report.chunks_skipped_existing,
            failed_batches = report.failed_batches.len(),
            cancelled = report.cancelled,
            "indexing run finished"
        );
        Ok(report)
    }

    async fn apply_quota(
        &self,
        tenant: &Tenant,
        collection: &Collection,
        admitted: Vec<Document>,
        report: &mut IndexReport,
    ) -> Result<Vec<Document>> {
        let Some(limit) = tenant.quota.max_documents else {
            return Ok(admitted);
        };
        if tenant.id.is_demo() {
            return Ok(admitted);
        }

        let mut known = with_timeout(
            self.manager.op_timeout(),
            collection.store().document_ids(&collection.name),
        )
        .await?;

        let mut kept = Vec::with_capacity(admitted.len());
        for doc in admitted {
            let id = doc.id();
            if known.contains(&id) || (known.len() as u64) < limit {
                known.insert(id);
                kept.push(doc);
            } else {
                warn!(document = %id, limit, "document skipped: tenant quota reached");
                report.skip_reasons.push(SkipRecord {
                    document_id: id,
                    reason: SkipReason::QuotaExceeded { limit },
                    quality_score: doc.quality_score(),
                    issues: Vec::new(),
                });
            }
        }
        Ok(kept)
    }

    fn build_records(
        &self,
        tenant: &TenantId,
        collection: &Collection,
        documents: &[Document],
    ) -> Vec<StorageRecord> {
        let mode = collection.store().metadata_mode();
        let indexed_at = Utc::now();
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for doc in documents {
            for chunk in chunk_document(doc, tenant, &self.config.chunking, indexed_at) {
                if seen.insert(chunk.id.clone()) {
                    records.push(StorageRecord::from_chunk(&chunk, mode));
                }
            }
        }
        debug!(collection = %collection.name, chunks = records.len(), "chunked admitted documents");
        records
    }

    /// Writes `records` batch by batch. Returns the ids of documents with at
    /// least one chunk that did not reach the store.
    async fn write_batches(
        &self,
        collection: &Collection,
        records: Vec<StorageRecord>,
        batch_size: usize,
        cancel: &CancelFlag,
        report: &mut IndexReport,
    ) -> HashSet<String> {
        let mut unwritten = HashSet::new();
        let mark = |batch: &[StorageRecord], unwritten: &mut HashSet<String>| {
            unwritten.extend(
                batch
                    .iter()
                    .filter_map(|r| r.get_str("document_id").map(str::to_string)),
            );
        };
        let batches: Vec<&[StorageRecord]> = records.chunks(batch_size).collect();
        for (batch_index, batch) in batches.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                warn!(run_id = %report.run_id, batch_index, "indexing run cancelled");
                report.cancelled = true;
                for rest in &batches[batch_index..] {
                    mark(rest, &mut unwritten);
                }
                break;
            }
            match with_timeout(self.config.batch_timeout, self.write_batch(collection, batch)).await
            {
                Ok((written, existing)) => {
                    report.chunks_created += written;
                    report.chunks_skipped_existing += existing;
                    debug!(batch_index, written, existing, "batch written");
                }
                Err(e) => {
                    error!(batch_index, chunks = batch.len(), error = %e, "batch failed");
                    mark(batch, &mut unwritten);
                    report.chunks_failed += batch.len();
                    report.failed_batches.push(BatchFailure {
                        batch_index,
                        chunk_count: batch.len(),
                        error: e.to_string(),
                    });
                }
            }
        }
        unwritten
    }

    /// Returns `(written, already_present)`.
    async fn write_batch(
        &self,
        collection: &Collection,
        batch: &[StorageRecord],
    ) -> Result<(usize, usize)> {
        let store = collection.store();
        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
        let existing = store.existing_ids(&collection.name, &ids).await?;
        let fresh: Vec<StorageRecord> = batch
            .iter()
            .filter(|r| !existing.contains(&r.id))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok((0, existing.len()));
        }

        let texts: Vec<String> = fresh.iter().map(|r| r.document.clone()).collect();
        let embeddings = self.manager.embedder().embed(&texts).await?;
        if embeddings.len() != fresh.len() {
            return Err(IndexError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                fresh.len()
            )));
        }
        store.upsert(&collection.name, &fresh, &embeddings).await?;
        Ok((fresh.len(), existing.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Integration, IssueType, Severity, SourceType};
    use serde_json::Map;

    fn annotated(q: f64, high: bool) -> Document {
        let mut doc = Document::new("body", SourceType::Code, "acme");
        doc.integration = Some(Integration {
            quality_score: q,
            relationships: vec![],
            issues: if high {
                vec![Issue {
                    kind: IssueType::SecurityRisk,
                    severity: Severity::High,
                    description: "key".into(),
                    suggestion: "rotate".into(),
                }]
            } else {
                vec![]
            },
            semantic_context: Map::new(),
            breakdown: None,
        });
        doc
    }

    #[test]
    fn test_admit_threshold_boundary() {
        assert!(admit(&annotated(0.5, false), 0.5, true).is_ok());
        assert!(matches!(
            admit(&annotated(0.49, false), 0.5, true),
            Err(SkipReason::LowQuality { .. })
        ));
    }

    #[test]
    fn test_admit_unannotated_always_passes_quality() {
        let doc = Document::new("body", SourceType::Code, "acme");
        assert!(admit(&doc, 1.0, true).is_ok());
    }

    #[test]
    fn test_admit_high_severity_toggle() {
        assert!(matches!(
            admit(&annotated(0.9, true), 0.5, true),
            Err(SkipReason::HighSeverityIssues { count: 1 })
        ));
        assert!(admit(&annotated(0.9, true), 0.5, false).is_ok());
    }

    #[test]
    fn test_validate_document() {
        let acme = TenantId::organization("acme").unwrap();
        assert!(validate_document(&Document::new("x", SourceType::Code, "acme"), &acme).is_ok());
        assert!(matches!(
            validate_document(&Document::new("  ", SourceType::Code, "acme"), &acme),
            Err(IndexError::InvalidDocument(_))
        ));
        assert!(matches!(
            validate_document(&Document::new("x", SourceType::Code, ""), &acme),
            Err(IndexError::InvalidDocument(_))
        ));
        assert!(matches!(
            validate_document(&Document::new("x", SourceType::Code, "globex"), &acme),
            Err(IndexError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(IndexerConfig::default().validate().is_ok());
        let bad = IndexerConfig {
            quality_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(IndexError::Config(_))));
        let bad = IndexerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_skip_reason_serializes_tagged() {
        let rec = SkipRecord {
            document_id: "a".into(),
            reason: SkipReason::QuotaExceeded { limit: 3 },
            quality_score: 1.0,
            issues: vec![],
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["reason"], "quota_exceeded");
        assert_eq!(v["limit"], 3);
    }
}
