//! Tenant-aware access to vector stores.
//!
//! [`VectorStoreManager`] owns the base directory, the store backend, and
//! the deployment's embedder. It opens each tenant's store at
//! `<base>/<tenant>` on first use, caches the handle per tenant, and wraps
//! every store call in the configured operation timeout.
//!
//! A failure to open a tenant's store is returned to the caller; there is
//! no fallback to another tenant's store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::{with_timeout, IndexError, Result};
use crate::store::{CollectionInfo, DumpedRecord, StoreBackend, VectorStore};
use crate::tenant::{Category, TenantId};

pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

const RESTORE_BATCH: usize = 100;

/// A resolved collection handle.
#[derive(Clone)]
pub struct Collection {
    pub name: String,
    pub tenant: TenantId,
    pub category: Category,
    pub info: CollectionInfo,
    store: Arc<dyn VectorStore>,
}

impl Collection {
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("tenant", &self.tenant)
            .field("category", &self.category)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_documents: u64,
    pub collections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionBackup {
    pub info: CollectionInfo,
    pub records: Vec<DumpedRecord>,
}

/// On-disk backup format for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub tenant: String,
    pub created_at: String,
    pub embedding_model: String,
    pub collections: Vec<CollectionBackup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupReport {
    pub path: PathBuf,
    pub collections: usize,
    pub records: usize,
}

pub struct VectorStoreManager {
    base_path: PathBuf,
    backend: Arc<dyn StoreBackend>,
    embedder: Arc<dyn Embedder>,
    op_timeout: Duration,
    clients: RwLock<HashMap<TenantId, Arc<dyn VectorStore>>>,
}

impl VectorStoreManager {
    pub fn new(
        base_path: impl Into<PathBuf>,
        backend: Arc<dyn StoreBackend>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            backend,
            embedder,
            op_timeout: DEFAULT_OP_TIMEOUT,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub fn tenant_root(&self, tenant: &TenantId) -> PathBuf {
        tenant.store_root(&self.base_path)
    }

    fn cached(&self, tenant: &TenantId) -> Option<Arc<dyn VectorStore>> {
        self.clients
            .read()
            .ok()
            .and_then(|c| c.get(tenant).cloned())
    }

    fn evict(&self, tenant: &TenantId) {
        if let Ok(mut clients) = self.clients.write() {
            clients.remove(tenant);
        }
    }

    /// Open (or reuse) the tenant's store and verify it responds.
    pub async fn initialize(&self, tenant: &TenantId) -> Result<Arc<dyn VectorStore>> {
        if let Some(store) = self.cached(tenant) {
            return Ok(store);
        }
        let root = self.tenant_root(tenant);
        let store = with_timeout(self.op_timeout, self.backend.open(&root)).await?;
        with_timeout(self.op_timeout, store.ping())
            .await
            .map_err(|e| IndexError::StoreUnavailable(e.to_string()))?;
        debug!(tenant = %tenant, root = %root.display(), backend = self.backend.name(), "opened tenant store");

        let mut clients = self
            .clients
            .write()
            .map_err(|_| IndexError::Store("client cache lock poisoned".into()))?;
        Ok(clients.entry(tenant.clone()).or_insert(store).clone())
    }

    fn base_metadata(&self, tenant: &TenantId, category: Category) -> Map<String, Value> {
        let mut m = Map::new();
        match tenant {
            TenantId::Demo => {
                m.insert("demo_mode".into(), json!(true));
            }
            TenantId::Organization(id) => {
                m.insert("org_id".into(), json!(id));
            }
        }
        m.insert("tenant_id".into(), json!(tenant.as_str()));
        m.insert("category".into(), json!(category.as_str()));
        m.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
        m.insert("embedding_model".into(), json!(self.embedder.model_name()));
        m.insert("embedding_dims".into(), json!(self.embedder.dims()));
        m
    }

    pub async fn get_or_create_collection(
        &self,
        tenant: &TenantId,
        category: Category,
    ) -> Result<Collection> {
        let store = self.initialize(tenant).await?;
        let name = tenant.collection_name(category);
        let metadata = self.base_metadata(tenant, category);
        let info = with_timeout(
            self.op_timeout,
            store.get_or_create_collection(&name, &metadata),
        )
        .await?;

        if let Some(model) = info.metadata.get("embedding_model").and_then(Value::as_str) {
            if model != self.embedder.model_name() {
                warn!(
                    collection = %name,
                    stored = model,
                    configured = self.embedder.model_name(),
                    "collection was created with a different embedding model"
                );
            }
        }

        Ok(Collection {
            name,
            tenant: tenant.clone(),
            category,
            info,
            store,
        })
    }

    pub async fn get_collection(
        &self,
        tenant: &TenantId,
        category: Category,
    ) -> Result<Option<Collection>> {
        let store = self.initialize(tenant).await?;
        let name = tenant.collection_name(category);
        let info = with_timeout(self.op_timeout, store.get_collection(&name)).await?;
        Ok(info.map(|info| Collection {
            name,
            tenant: tenant.clone(),
            category,
            info,
            store,
        }))
    }

    /// Collections in the tenant's namespace.
    pub async fn list_collections(&self, tenant: &TenantId) -> Result<Vec<CollectionInfo>> {
        let store = self.initialize(tenant).await?;
        let all = with_timeout(self.op_timeout, store.list_collections()).await?;
        Ok(all
            .into_iter()
            .filter(|c| tenant.owns_collection(&c.name))
            .collect())
    }

    pub async fn stats(&self, tenant: &TenantId) -> Result<BTreeMap<String, CollectionStats>> {
        let store = self.initialize(tenant).await?;
        let mut out = BTreeMap::new();
        for info in self.list_collections(tenant).await? {
            let count = with_timeout(self.op_timeout, store.count(&info.name)).await?;
            out.insert(
                info.name.clone(),
                CollectionStats {
                    count,
                    metadata: info.metadata,
                },
            );
        }
        Ok(out)
    }

    /// Never fails; problems are reported in the returned status.
    pub async fn health_check(&self, tenant: &TenantId) -> HealthReport {
        match self.stats(tenant).await {
            Ok(stats) => {
                let total: u64 = stats.values().map(|s| s.count).sum();
                HealthReport {
                    status: if total > 0 {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Empty
                    },
                    total_documents: total,
                    collections: stats.len(),
                    error: None,
                }
            }
            Err(e) => HealthReport {
                status: HealthStatus::Error,
                total_documents: 0,
                collections: 0,
                error: Some(e.to_string()),
            },
        }
    }

    /// Drop one collection; returns whether it existed.
    pub async fn reset_collection(&self, tenant: &TenantId, category: Category) -> Result<bool> {
        let store = self.initialize(tenant).await?;
        let name = tenant.collection_name(category);
        let existed = with_timeout(self.op_timeout, store.delete_collection(&name)).await?;
        info!(tenant = %tenant, collection = %name, existed, "reset collection");
        Ok(existed)
    }

    /// Remove every chunk of one document from a collection.
    pub async fn delete_document(
        &self,
        tenant: &TenantId,
        category: Category,
        document_id: &str,
    ) -> Result<u64> {
        let Some(collection) = self.get_collection(tenant, category).await? else {
            return Ok(0);
        };
        let removed = with_timeout(
            self.op_timeout,
            collection
                .store
                .delete_where(&collection.name, "document_id", &json!(document_id)),
        )
        .await?;
        info!(tenant = %tenant, collection = %collection.name, document_id, removed, "deleted document");
        Ok(removed)
    }

    /// Drop every collection the tenant owns; returns how many were dropped.
    pub async fn delete_all_for_tenant(&self, tenant: &TenantId) -> Result<usize> {
        let store = self.initialize(tenant).await?;
        let mut dropped = 0;
        for info in self.list_collections(tenant).await? {
            if with_timeout(self.op_timeout, store.delete_collection(&info.name)).await? {
                dropped += 1;
            }
        }
        self.evict(tenant);
        warn!(tenant = %tenant, dropped, "deleted all collections for tenant");
        Ok(dropped)
    }

    /// Write every collection the tenant owns to a pretty JSON file.
    pub async fn backup(&self, tenant: &TenantId, path: &Path) -> Result<BackupReport> {
        let store = self.initialize(tenant).await?;
        let mut collections = Vec::new();
        let mut records = 0;
        for info in self.list_collections(tenant).await? {
            let dumped = with_timeout(self.op_timeout, store.dump(&info.name)).await?;
            records += dumped.len();
            collections.push(CollectionBackup {
                info,
                records: dumped,
            });
        }

        let manifest = BackupManifest {
            tenant: tenant.as_str().to_string(),
            created_at: Utc::now().to_rfc3339(),
            embedding_model: self.embedder.model_name().to_string(),
            collections,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;

        let report = BackupReport {
            path: path.to_path_buf(),
            collections: manifest.collections.len(),
            records,
        };
        info!(tenant = %tenant, path = %path.display(), collections = report.collections, records, "backup written");
        Ok(report)
    }

    /// Load a backup into the tenant's store. Backups taken for another
    /// tenant, or containing collections outside this tenant's namespace,
    /// are refused before anything is written.
    pub async fn restore(&self, tenant: &TenantId, path: &Path) -> Result<BackupReport> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: BackupManifest = serde_json::from_str(&raw)?;
        if manifest.tenant != tenant.as_str() {
            return Err(IndexError::TenantMismatch {
                expected: tenant.as_str().to_string(),
                found: manifest.tenant,
            });
        }
        if let Some(foreign) = manifest
            .collections
            .iter()
            .find(|c| !tenant.owns_collection(&c.info.name))
        {
            return Err(IndexError::TenantMismatch {
                expected: tenant.collection_prefix(),
                found: foreign.info.name.clone(),
            });
        }
        if manifest.embedding_model != self.embedder.model_name() {
            warn!(
                backup = %manifest.embedding_model,
                configured = self.embedder.model_name(),
                "restoring vectors produced by a different embedding model"
            );
        }

        let store = self.initialize(tenant).await?;
        let mode = store.metadata_mode();
        let mut records = 0;
        for backup in &manifest.collections {
            with_timeout(
                self.op_timeout,
                store.get_or_create_collection(&backup.info.name, &backup.info.metadata),
            )
            .await?;
            for batch in backup.records.chunks(RESTORE_BATCH) {
                let recs: Vec<_> = batch
                    .iter()
                    .map(|d| d.record.clone().into_mode(mode))
                    .collect();
                let vecs: Vec<Vec<f32>> = batch.iter().map(|d| d.embedding.clone()).collect();
                with_timeout(
                    self.op_timeout,
                    store.upsert(&backup.info.name, &recs, &vecs),
                )
                .await?;
                records += recs.len();
            }
        }

        info!(tenant = %tenant, path = %path.display(), records, "backup restored");
        Ok(BackupReport {
            path: path.to_path_buf(),
            collections: manifest.collections.len(),
            records,
        })
    }
}
