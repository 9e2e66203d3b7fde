//! End-to-end runs of the indexing pipeline against the in-memory backend.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

use corpus_index_core::analysis::Analyzer;
use corpus_index_core::embedding::HashingEmbedder;
use corpus_index_core::error::{IndexError, Result};
use corpus_index_core::indexer::{CancelFlag, Indexer, IndexerConfig, SkipReason};
use corpus_index_core::manager::VectorStoreManager;
use corpus_index_core::models::{Document, SourceType};
use corpus_index_core::record::{MetadataMode, StorageRecord};
use corpus_index_core::search::{search, SearchRequest};
use corpus_index_core::store::memory::{InMemoryBackend, InMemoryStore};
use corpus_index_core::store::{
    CollectionInfo, DumpedRecord, ScopedFilter, StoreBackend, StoredHit, VectorStore,
};
use corpus_index_core::tenant::{Category, Tenant, TenantId, TenantQuota};

fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn manager_with(backend: Arc<dyn StoreBackend>) -> Arc<VectorStoreManager> {
    Arc::new(VectorStoreManager::new(
        "/stores",
        backend,
        Arc::new(HashingEmbedder::default()),
    ))
}

fn memory_manager() -> Arc<VectorStoreManager> {
    manager_with(Arc::new(InMemoryBackend::new()))
}

fn org(id: &str) -> Tenant {
    Tenant::new(TenantId::organization(id).unwrap(), TenantQuota::default())
}

fn unanalyzed() -> IndexerConfig {
    IndexerConfig {
        analyze: false,
        ..Default::default()
    }
}

fn code_doc(tenant: &str, path: &str, body: &str) -> Document {
    Document::new(body, SourceType::Code, tenant).with_path(path)
}

fn scenario_batch() -> Vec<Document> {
    let now = fixed_now();
    vec![
        Document::new(
            "/// Sums invoice lines.\n// uses apply_tax_rate\npub fn calculate_invoice_total(lines: &[Line]) -> u64 {\n    apply_tax_rate(lines)\n}",
            SourceType::Code,
            "acme",
        )
        .with_path("src/invoice.rs")
        .with_modified_at(now - Duration::days(2)),
        Document::new(
            "Setup notes. TODO describe the flow.",
            SourceType::Documentation,
            "acme",
        )
        .with_path("docs/setup.md")
        .with_modified_at(now - Duration::days(200)),
        Document::new(
            "[2024-05-31 09:00] alice: the nightly export calling calculate_invoice_total timed out again\n\
             [2024-05-31 09:04] bob: apply_tax_rate is slow on large invoices, I will profile it\n\
             [2024-05-31 09:06] alice: thanks, ping me when you have numbers\n\
             [2024-05-31 14:30] carol: separate topic, the staging database gets upgraded tonight\n\
             [2024-05-31 14:32] bob: noted, I will pause the export job",
            SourceType::Conversation,
            "acme",
        )
        .with_name("billing-thread")
        .with_modified_at(now - Duration::days(1)),
    ]
}

async fn chunk_types(manager: &VectorStoreManager, tenant: &TenantId, category: Category) -> Vec<String> {
    let collection = manager
        .get_collection(tenant, category)
        .await
        .unwrap()
        .expect("collection exists");
    collection
        .store()
        .dump(&collection.name)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|d| d.record.get_str("chunk_type").map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_mixed_batch_skips_stale_doc_and_splits_conversation() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), IndexerConfig::default())
        .with_analyzer(Analyzer::with_now(fixed_now()));
    let acme = org("acme");

    let report = indexer
        .add_documents(&acme, scenario_batch(), "main", None)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.collection, "org_acme_main");
    assert_eq!(report.documents_received, 3);
    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.skip_reasons[0].document_id, "docs/setup.md");
    assert!(matches!(
        report.skip_reasons[0].reason,
        SkipReason::LowQuality { .. }
    ));
    assert_eq!(report.skip_counts()["low_quality"], 1);
    assert!(report.run_summary.is_some());

    let types = chunk_types(&manager, &acme.id, Category::Main).await;
    assert_eq!(types.len(), report.chunks_created);
    assert_eq!(types.iter().filter(|t| *t == "conversation").count(), 2);
    assert!(types.iter().any(|t| t == "code"));

    let resp = search(
        &manager,
        &acme.id,
        &SearchRequest {
            query: "calculate_invoice_total",
            category: "main",
            n_results: 5,
            quality_threshold: None,
            source_type: None,
        },
    )
    .await
    .unwrap();
    assert!(!resp.is_empty());
    assert_eq!(resp.metadatas[0]["document_id"], json!("src/invoice.rs"));
    assert_eq!(resp.metadatas[0]["chunk_type"], json!("code"));
}

#[test]
fn test_scenario_scores_code_high_and_stale_doc_low() {
    let outcome = Analyzer::with_now(fixed_now()).analyze(scenario_batch());
    let score_of = |id: &str| {
        outcome
            .documents
            .iter()
            .find(|d| d.id() == id)
            .map(|d| d.quality_score())
            .unwrap()
    };
    assert!(score_of("src/invoice.rs") >= 0.7, "{}", score_of("src/invoice.rs"));
    assert!(score_of("docs/setup.md") < 0.5, "{}", score_of("docs/setup.md"));
}

#[tokio::test]
async fn test_rerun_writes_nothing_new() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), IndexerConfig::default())
        .with_analyzer(Analyzer::with_now(fixed_now()));
    let acme = org("acme");

    let first = indexer
        .add_documents(&acme, scenario_batch(), "main", None)
        .await
        .unwrap();
    let second = indexer
        .add_documents(&acme, scenario_batch(), "main", None)
        .await
        .unwrap();

    assert!(first.chunks_created > 0);
    assert_eq!(second.chunks_created, 0);
    assert_eq!(second.chunks_skipped_existing, first.chunks_created);
    let stats = manager.stats(&acme.id).await.unwrap();
    assert_eq!(stats["org_acme_main"].count as usize, first.chunks_created);
}

#[tokio::test]
async fn test_foreign_documents_are_rejected_per_document() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager, unanalyzed());
    let docs = vec![
        code_doc("acme", "src/a.rs", "fn a() {}"),
        code_doc("globex", "src/b.rs", "fn b() {}"),
        code_doc("acme", "src/empty.rs", "   "),
    ];
    let report = indexer
        .add_documents(&org("acme"), docs, "code", None)
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.failed_documents.len(), 2);
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), unanalyzed());
    let body = "fn reconcile_ledger_entries() { settle() }";

    indexer
        .add_documents(&org("acme"), vec![code_doc("acme", "src/ledger.rs", body)], "code", None)
        .await
        .unwrap();
    indexer
        .add_documents(&org("globex"), vec![code_doc("globex", "src/ledger.rs", body)], "code", None)
        .await
        .unwrap();
    indexer
        .add_documents(&Tenant::demo(), vec![code_doc("demo", "src/ledger.rs", body)], "code", None)
        .await
        .unwrap();

    let req = SearchRequest {
        query: "reconcile_ledger_entries",
        category: "code",
        n_results: 10,
        quality_threshold: None,
        source_type: None,
    };
    let globex = TenantId::organization("globex").unwrap();
    let resp = search(&manager, &globex, &req).await.unwrap();
    assert_eq!(resp.len(), 1);
    assert!(resp
        .metadatas
        .iter()
        .all(|m| m["tenant_id"] == json!("globex")));

    let demo = search(&manager, &TenantId::Demo, &req).await.unwrap();
    assert_eq!(demo.len(), 1);
    assert_eq!(demo.metadatas[0]["demo_mode"], json!(true));

    let names: Vec<String> = manager
        .list_collections(&globex)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["org_globex_code".to_string()]);
}

#[tokio::test]
async fn test_search_ranks_matching_document_first() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), unanalyzed());
    let docs = vec![
        code_doc("acme", "src/http.rs", "fn start_http_server(port: u16) { listen(port) }"),
        code_doc("acme", "src/ledger.rs", "fn reconcile_ledger_entries(book: &Book) { book.settle() }"),
        code_doc("acme", "src/mail.rs", "fn send_welcome_email(user: &User) { smtp.send(user) }"),
    ];
    indexer
        .add_documents(&org("acme"), docs, "code", None)
        .await
        .unwrap();

    let acme = TenantId::organization("acme").unwrap();
    let resp = search(
        &manager,
        &acme,
        &SearchRequest {
            query: "reconcile ledger entries",
            category: "code",
            n_results: 2,
            quality_threshold: None,
            source_type: Some(SourceType::Code),
        },
    )
    .await
    .unwrap();

    assert_eq!(resp.len(), 2);
    assert_eq!(resp.metadatas[0]["document_id"], json!("src/ledger.rs"));
    assert!(resp.distances[0] <= resp.distances[1]);
    assert_eq!(resp.aggregate_analysis.total_results, 2);
    assert_eq!(resp.aggregate_analysis.source_types["code"], 2);
}

#[tokio::test]
async fn test_search_edge_cases() {
    let manager = memory_manager();
    let acme = TenantId::organization("acme").unwrap();
    let mut req = SearchRequest {
        query: "anything",
        category: "tickets",
        n_results: 5,
        quality_threshold: Some(0.9),
        source_type: None,
    };
    assert!(search(&manager, &acme, &req).await.unwrap().is_empty());

    req.query = "   ";
    assert!(search(&manager, &acme, &req).await.unwrap().is_empty());

    req.category = "wiki";
    assert!(matches!(
        search(&manager, &acme, &req).await,
        Err(IndexError::InvalidCategory(_))
    ));
}

#[tokio::test]
async fn test_quota_skips_surplus_documents() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager, unanalyzed());
    let tenant = Tenant::new(
        TenantId::organization("acme").unwrap(),
        TenantQuota {
            max_documents: Some(2),
            ..Default::default()
        },
    );

    let first = indexer
        .add_documents(
            &tenant,
            vec![
                code_doc("acme", "src/a.rs", "fn a() {}"),
                code_doc("acme", "src/b.rs", "fn b() {}"),
                code_doc("acme", "src/c.rs", "fn c() {}"),
            ],
            "code",
            None,
        )
        .await
        .unwrap();
    assert_eq!(first.documents_processed, 2);
    assert_eq!(first.skip_counts()["quota_exceeded"], 1);

    // Documents already stored still count as room for their own updates.
    let second = indexer
        .add_documents(
            &tenant,
            vec![code_doc("acme", "src/a.rs", "fn a() { changed() }")],
            "code",
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.documents_processed, 1);
    assert_eq!(second.documents_skipped, 0);
}

#[tokio::test]
async fn test_demo_tenant_ignores_quota() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager, unanalyzed());
    let demo = Tenant::new(
        TenantId::Demo,
        TenantQuota {
            max_documents: Some(1),
            ..Default::default()
        },
    );
    let report = indexer
        .add_documents(
            &demo,
            vec![
                code_doc("demo", "src/a.rs", "fn a() {}"),
                code_doc("demo", "src/b.rs", "fn b() {}"),
            ],
            "main",
            None,
        )
        .await
        .unwrap();
    assert_eq!(report.documents_processed, 2);
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), unanalyzed());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = indexer
        .add_documents_with_cancel(
            &org("acme"),
            vec![code_doc("acme", "src/a.rs", "fn a() {}")],
            "code",
            None,
            &cancel,
        )
        .await
        .unwrap();
    assert!(report.cancelled);
    assert!(!report.success);
    assert_eq!(report.chunks_created, 0);
    assert_eq!(report.documents_processed, 0);
    let stats = manager
        .stats(&TenantId::organization("acme").unwrap())
        .await
        .unwrap();
    assert_eq!(stats["org_acme_code"].count, 0);
}

#[tokio::test]
async fn test_unavailable_store_fails_the_run() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.set_offline(true);
    let indexer = Indexer::new(manager_with(backend), unanalyzed());
    let err = indexer
        .add_documents(&org("acme"), vec![code_doc("acme", "a.rs", "fn a() {}")], "code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_invalid_category_is_fatal() {
    let indexer = Indexer::new(memory_manager(), unanalyzed());
    let err = indexer
        .add_documents(&org("acme"), vec![code_doc("acme", "a.rs", "fn a() {}")], "wiki", None)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidCategory(_)));
}

/// Store that rejects one specific upsert call.
struct FlakyStore {
    inner: InMemoryStore,
    upserts: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn metadata_mode(&self) -> MetadataMode {
        self.inner.metadata_mode()
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Map<String, Value>,
    ) -> Result<CollectionInfo> {
        self.inner.get_or_create_collection(name, metadata).await
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.inner.get_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.inner.list_collections().await
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.inner.delete_collection(name).await
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.inner.count(collection).await
    }

    async fn existing_ids(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        self.inner.existing_ids(collection, ids).await
    }

    async fn document_ids(&self, collection: &str) -> Result<HashSet<String>> {
        self.inner.document_ids(collection).await
    }

    async fn upsert(
        &self,
        collection: &str,
        records: &[StorageRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(IndexError::Store("disk full".into()));
        }
        self.inner.upsert(collection, records, embeddings).await
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: &ScopedFilter,
    ) -> Result<Vec<StoredHit>> {
        self.inner.query(collection, embedding, n_results, filter).await
    }

    async fn delete_where(&self, collection: &str, key: &str, value: &Value) -> Result<u64> {
        self.inner.delete_where(collection, key, value).await
    }

    async fn dump(&self, collection: &str) -> Result<Vec<DumpedRecord>> {
        self.inner.dump(collection).await
    }
}

struct FlakyBackend {
    store: Arc<FlakyStore>,
}

#[async_trait]
impl StoreBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn open(&self, _root: &Path) -> Result<Arc<dyn VectorStore>> {
        Ok(self.store.clone())
    }
}

#[tokio::test]
async fn test_failed_batch_is_recorded_and_run_continues() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        upserts: AtomicUsize::new(0),
        fail_on: 1,
    });
    let manager = manager_with(Arc::new(FlakyBackend {
        store: store.clone(),
    }));
    let indexer = Indexer::new(manager, unanalyzed());

    let report = indexer
        .add_documents(
            &org("acme"),
            vec![
                code_doc("acme", "src/a.rs", "fn a() {}"),
                code_doc("acme", "src/b.rs", "fn b() {}"),
                code_doc("acme", "src/c.rs", "fn c() {}"),
            ],
            "code",
            Some(1),
        )
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.failed_batches.len(), 1);
    assert_eq!(report.failed_batches[0].batch_index, 1);
    assert!(report.failed_batches[0].error.contains("disk full"));
    assert_eq!(report.chunks_created, 2);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.documents_processed, 2);
    assert_eq!(store.count("org_acme_code").await.unwrap(), 2);
}

#[tokio::test]
async fn test_backup_then_restore_round_trips_a_tenant() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), unanalyzed());
    let acme = org("acme");
    let report = indexer
        .add_documents(
            &acme,
            vec![
                code_doc("acme", "src/a.rs", "fn a() {}"),
                code_doc("acme", "src/b.rs", "fn b() {}"),
            ],
            "code",
            None,
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backups").join("acme.json");
    let backup = manager.backup(&acme.id, &path).await.unwrap();
    assert_eq!(backup.records, report.chunks_created);

    assert_eq!(manager.delete_all_for_tenant(&acme.id).await.unwrap(), 1);
    assert!(manager.stats(&acme.id).await.unwrap().is_empty());

    let restored = manager.restore(&acme.id, &path).await.unwrap();
    assert_eq!(restored.records, report.chunks_created);
    let stats = manager.stats(&acme.id).await.unwrap();
    assert_eq!(stats["org_acme_code"].count as usize, report.chunks_created);
}

#[tokio::test]
async fn test_delete_document_removes_its_chunks() {
    let manager = memory_manager();
    let indexer = Indexer::new(manager.clone(), unanalyzed());
    let acme = org("acme");
    indexer
        .add_documents(
            &acme,
            vec![
                code_doc("acme", "src/a.rs", "fn a() {}"),
                code_doc("acme", "src/b.rs", "fn b() {}"),
            ],
            "code",
            None,
        )
        .await
        .unwrap();

    let removed = manager
        .delete_document(&acme.id, Category::Code, "src/a.rs")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let stats = manager.stats(&acme.id).await.unwrap();
    assert_eq!(stats["org_acme_code"].count, 1);
}
