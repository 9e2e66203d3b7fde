//! Vector store abstraction.
//!
//! A [`VectorStore`] is one tenant's store: named collections of
//! [`StorageRecord`]s with embeddings. A [`StoreBackend`] opens a store for
//! a tenant's root directory. Backends shipped here:
//!
//! - [`memory::InMemoryBackend`]: process-local, structured metadata.
//! - SQLite, in the `corpus-index` app crate: file-backed, flat metadata.
//!
//! Every similarity query takes a [`ScopedFilter`], which can only be built
//! from a tenant, so a query can never omit the tenant predicate.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_or_create_collection`](VectorStore::get_or_create_collection) | Create a collection or return the existing one unchanged |
//! | [`existing_ids`](VectorStore::existing_ids) | Which of the given ids are already stored |
//! | [`upsert`](VectorStore::upsert) | Insert or replace records with their embeddings |
//! | [`query`](VectorStore::query) | Nearest neighbors under a tenant filter |
//! | [`delete_where`](VectorStore::delete_where) | Remove records by metadata equality |
//! | [`dump`](VectorStore::dump) | Every record and embedding, for backup |

pub mod memory;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::record::{MetadataMode, StorageRecord};
use crate::tenant::TenantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub metadata: Map<String, Value>,
}

/// One predicate over record metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String, Value),
    AtLeast(String, f64),
}

impl Condition {
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Condition::Equals(key, expected) => metadata
                .get(key)
                .is_some_and(|actual| values_equal(actual, expected)),
            Condition::AtLeast(key, min) => metadata
                .get(key)
                .and_then(Value::as_f64)
                .is_some_and(|v| v >= *min),
        }
    }
}

/// JSON equality with numbers compared by value (`1` == `1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Conjunctive metadata filter that always carries a tenant predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedFilter {
    tenant: Condition,
    extra: Vec<Condition>,
}

impl ScopedFilter {
    /// Demo scope matches `demo_mode == true`; an organization matches
    /// `tenant_id == <org_id>`.
    pub fn for_tenant(tenant: &TenantId) -> Self {
        let tenant = match tenant {
            TenantId::Demo => Condition::Equals("demo_mode".into(), Value::Bool(true)),
            TenantId::Organization(id) => {
                Condition::Equals("tenant_id".into(), Value::String(id.clone()))
            }
        };
        Self {
            tenant,
            extra: Vec::new(),
        }
    }

    pub fn and_equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.push(Condition::Equals(key.into(), value.into()));
        self
    }

    pub fn and_at_least(mut self, key: impl Into<String>, min: f64) -> Self {
        self.extra.push(Condition::AtLeast(key.into(), min));
        self
    }

    /// All conditions, tenant predicate first.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        std::iter::once(&self.tenant).chain(self.extra.iter())
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.conditions().all(|c| c.matches(metadata))
    }
}

/// A query result row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    /// `1 - cosine similarity`; smaller is closer.
    pub distance: f32,
}

/// A record with its embedding, as written to backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpedRecord {
    #[serde(flatten)]
    pub record: StorageRecord,
    pub embedding: Vec<f32>,
}

/// One tenant's vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Metadata representation this store accepts.
    fn metadata_mode(&self) -> MetadataMode {
        MetadataMode::Flat
    }

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;

    /// Create `name` with `metadata`, or return the existing collection
    /// without modifying its metadata.
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Map<String, Value>,
    ) -> Result<CollectionInfo>;

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Returns `false` if the collection did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    async fn count(&self, collection: &str) -> Result<u64>;

    async fn existing_ids(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Distinct `document_id` values in a collection.
    async fn document_ids(&self, collection: &str) -> Result<HashSet<String>>;

    /// Insert or replace; `embeddings[i]` belongs to `records[i]`.
    async fn upsert(
        &self,
        collection: &str,
        records: &[StorageRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<()>;

    /// Up to `n_results` records matching `filter`, nearest first.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: &ScopedFilter,
    ) -> Result<Vec<StoredHit>>;

    /// Delete records whose metadata `key` equals `value`; returns the count.
    async fn delete_where(&self, collection: &str, key: &str, value: &Value) -> Result<u64>;

    async fn dump(&self, collection: &str) -> Result<Vec<DumpedRecord>>;
}

/// Opens the store rooted at a tenant directory.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self, root: &Path) -> Result<Arc<dyn VectorStore>>;
}
