//! SQLite-backed [`VectorStore`] implementation.
//!
//! Each tenant store root holds one database file (see [`crate::db`]) with
//! two tables: `collections` and `records`. Vectors are stored as blobs and
//! searched brute-force: the collection's rows are loaded, the scoped
//! filter is applied to their metadata, and cosine distance is computed in
//! Rust.
//!
//! The store accepts flat metadata only (scalar values). Records are
//! flattened by the indexer before they reach [`SqliteStore::upsert`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use corpus_index_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use corpus_index_core::error::{IndexError, Result};
use corpus_index_core::record::StorageRecord;
use corpus_index_core::store::{
    values_equal, CollectionInfo, DumpedRecord, ScopedFilter, StoreBackend, StoredHit, VectorStore,
};

use crate::db;
use crate::migrate;

fn store_err(e: sqlx::Error) -> IndexError {
    IndexError::Store(e.to_string())
}

fn missing(name: &str) -> IndexError {
    IndexError::Store(format!("collection '{}' does not exist", name))
}

/// Undecodable metadata is a store error.
fn parse_metadata(raw: &str, owner: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(raw)
        .map_err(|e| IndexError::Store(format!("corrupt metadata for '{}': {}", owner, e)))
}

fn collection_info(row: &SqliteRow) -> Result<CollectionInfo> {
    let name: String = row.get("name");
    let raw: String = row.get("metadata_json");
    let metadata = parse_metadata(&raw, &name)?;
    Ok(CollectionInfo { name, metadata })
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the store under `root` and migrate it.
    pub async fn open(root: &Path) -> Result<Self> {
        let pool = db::connect(root)
            .await
            .map_err(|e| IndexError::StoreUnavailable(format!("{}: {:#}", root.display(), e)))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| IndexError::StoreUnavailable(format!("{}: {:#}", root.display(), e)))?;
        Ok(Self::new(pool))
    }

    async fn require(&self, name: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        if exists {
            Ok(())
        } else {
            Err(missing(name))
        }
    }
}

fn check_flat(record: &StorageRecord) -> Result<()> {
    for (key, value) in &record.metadata {
        if value.is_array() || value.is_object() {
            return Err(IndexError::Store(format!(
                "record {}: metadata key '{}' is not a scalar",
                record.id, key
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Map<String, Value>,
    ) -> Result<CollectionInfo> {
        let now = chrono::Utc::now().timestamp();
        let metadata_json = serde_json::to_string(metadata)?;
        // Existing collections keep their original metadata.
        sqlx::query(
            "INSERT INTO collections (name, metadata_json, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(&metadata_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.get_collection(name).await?.ok_or_else(|| missing(name))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query("SELECT name, metadata_json FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(collection_info).transpose()
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query("SELECT name, metadata_json FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(collection_info).collect()
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        let result = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.require(collection).await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(n as u64)
    }

    async fn existing_ids(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        self.require(collection).await?;
        let mut found = HashSet::new();
        // Stay well under SQLite's bound-parameter limit.
        for batch in ids.chunks(500) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id FROM records WHERE collection = ");
            qb.push_bind(collection);
            qb.push(" AND id IN (");
            let mut separated = qb.separated(", ");
            for id in batch {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
            let hits: Vec<String> = qb
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
            found.extend(hits);
        }
        Ok(found)
    }

    async fn document_ids(&self, collection: &str) -> Result<HashSet<String>> {
        self.require(collection).await?;
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT document_id FROM records WHERE collection = ? AND document_id IS NOT NULL",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(ids.into_iter().collect())
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
        for record in records {
            check_flat(record)?;
        }
        self.require(collection).await?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for (record, embedding) in records.iter().zip(embeddings) {
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document_id, document, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(record.get_str("document_id"))
            .bind(&record.document)
            .bind(serde_json::to_string(&record.metadata)?)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        debug!(collection, records = records.len(), "upserted records");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: &ScopedFilter,
    ) -> Result<Vec<StoredHit>> {
        self.require(collection).await?;
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut hits: Vec<StoredHit> = Vec::new();
        for row in &rows {
            let id: String = row.get("id");
            let raw: String = row.get("metadata_json");
            let metadata = parse_metadata(&raw, &id)?;
            if !filter.matches(&metadata) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            hits.push(StoredHit {
                id,
                document: row.get("document"),
                distance: cosine_distance(embedding, &blob_to_vec(&blob)),
                metadata,
            });
        }

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
        self.require(collection).await?;
        let rows = sqlx::query("SELECT id, metadata_json FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        let mut doomed: Vec<String> = Vec::new();
        for row in &rows {
            let id: String = row.get("id");
            let raw: String = row.get("metadata_json");
            if parse_metadata(&raw, &id)?
                .get(key)
                .is_some_and(|actual| values_equal(actual, value))
            {
                doomed.push(id);
            }
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for id in &doomed {
            sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(doomed.len() as u64)
    }

    async fn dump(&self, collection: &str) -> Result<Vec<DumpedRecord>> {
        self.require(collection).await?;
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let raw: String = row.get("metadata_json");
                let metadata = parse_metadata(&raw, &id)?;
                let blob: Vec<u8> = row.get("embedding");
                Ok(DumpedRecord {
                    record: StorageRecord {
                        id,
                        document: row.get("document"),
                        metadata,
                    },
                    embedding: blob_to_vec(&blob),
                })
            })
            .collect()
    }
}

/// Opens one SQLite database per tenant root.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackend;

#[async_trait]
impl StoreBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn open(&self, root: &Path) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(SqliteStore::open(root).await?))
    }
}
