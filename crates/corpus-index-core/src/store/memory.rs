//! In-memory [`VectorStore`] for tests and embedded use.
//!
//! Collections live in a `BTreeMap` behind `std::sync::RwLock`; queries are
//! brute-force cosine distance over the records that pass the filter.
//! [`InMemoryBackend`] keeps one store per root path for the life of the
//! backend, so reopening a tenant sees its earlier writes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    values_equal, CollectionInfo, DumpedRecord, ScopedFilter, StoreBackend, StoredHit, VectorStore,
};
use crate::embedding::cosine_distance;
use crate::error::{IndexError, Result};
use crate::record::{MetadataMode, StorageRecord};

struct MemCollection {
    info: CollectionInfo,
    records: BTreeMap<String, (StorageRecord, Vec<f32>)>,
}

pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, MemCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemCollection>>> {
        self.collections
            .read()
            .map_err(|_| IndexError::Store("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemCollection>>> {
        self.collections
            .write()
            .map_err(|_| IndexError::Store("memory store lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(name: &str) -> IndexError {
    IndexError::Store(format!("collection '{}' does not exist", name))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn metadata_mode(&self) -> MetadataMode {
        MetadataMode::Structured
    }

    async fn ping(&self) -> Result<()> {
        self.read().map(|_| ())
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Map<String, Value>,
    ) -> Result<CollectionInfo> {
        let mut guard = self.write()?;
        let entry = guard.entry(name.to_string()).or_insert_with(|| MemCollection {
            info: CollectionInfo {
                name: name.to_string(),
                metadata: metadata.clone(),
            },
            records: BTreeMap::new(),
        });
        Ok(entry.info.clone())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.get(name).map(|c| c.info.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.read()?.values().map(|c| c.info.clone()).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let guard = self.read()?;
        let c = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(c.records.len() as u64)
    }

    async fn existing_ids(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        let guard = self.read()?;
        let c = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter(|id| c.records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn document_ids(&self, collection: &str) -> Result<HashSet<String>> {
        let guard = self.read()?;
        let c = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(c.records
            .values()
            .filter_map(|(r, _)| r.get_str("document_id").map(str::to_string))
            .collect())
    }

    async fn upsert(
        &self,
        collection: &str,
        records: &[StorageRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if records.len() != embeddings.len() {
            return Err(IndexError::Store(format!(
                "{} records but {} embeddings",
                records.len(),
                embeddings.len()
            )));
        }
        let mut guard = self.write()?;
        let c = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        for (record, embedding) in records.iter().zip(embeddings) {
            c.records
                .insert(record.id.clone(), (record.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: &ScopedFilter,
    ) -> Result<Vec<StoredHit>> {
        let guard = self.read()?;
        let c = guard.get(collection).ok_or_else(|| missing(collection))?;
        let mut hits: Vec<StoredHit> = c
            .records
            .values()
            .filter(|(r, _)| filter.matches(&r.metadata))
            .map(|(r, v)| StoredHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(embedding, v),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn delete_where(&self, collection: &str, key: &str, value: &Value) -> Result<u64> {
        let mut guard = self.write()?;
        let c = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        let before = c.records.len();
        c.records.retain(|_, (r, _)| {
            !r.metadata
                .get(key)
                .is_some_and(|actual| values_equal(actual, value))
        });
        Ok((before - c.records.len()) as u64)
    }

    async fn dump(&self, collection: &str) -> Result<Vec<DumpedRecord>> {
        let guard = self.read()?;
        let c = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(c.records
            .values()
            .map(|(r, v)| DumpedRecord {
                record: r.clone(),
                embedding: v.clone(),
            })
            .collect())
    }
}

/// Backend handing out one [`InMemoryStore`] per root path.
#[derive(Default)]
pub struct InMemoryBackend {
    stores: RwLock<HashMap<PathBuf, Arc<InMemoryStore>>>,
    offline: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Roots opened so far.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.stores
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, root: &Path) -> Result<Arc<dyn VectorStore>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(IndexError::StoreUnavailable(format!(
                "memory backend offline for {}",
                root.display()
            )));
        }
        let mut stores = self
            .stores
            .write()
            .map_err(|_| IndexError::StoreUnavailable("memory backend lock poisoned".into()))?;
        let store = stores
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(InMemoryStore::new()))
            .clone();
        Ok(store)
    }
}
