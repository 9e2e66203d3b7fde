//! Storage records: the shape a chunk takes inside a vector store.
//!
//! Stores that accept only scalar metadata get a flattened copy:
//!
//! | Value | Stored as |
//! |-------|-----------|
//! | string, number, bool | unchanged |
//! | null | dropped |
//! | list of strings | `", "`-joined string under the same key |
//! | any other list, or a map | JSON string under `<key>_json` |
//!
//! Flattening is idempotent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Chunk;

/// Metadata representation a store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataMode {
    #[default]
    Flat,
    Structured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
}

impl StorageRecord {
    pub fn from_chunk(chunk: &Chunk, mode: MetadataMode) -> Self {
        let mut metadata = chunk.metadata.clone();
        metadata.insert("document_id".into(), Value::from(chunk.document_id.clone()));
        metadata.insert("chunk_index".into(), Value::from(chunk.chunk_index));
        metadata.insert("total_chunks".into(), Value::from(chunk.total_chunks));
        metadata.insert("token_count".into(), Value::from(chunk.token_count));
        metadata.insert("chunk_type".into(), Value::from(chunk.chunk_type.as_str()));
        metadata.insert("tenant_id".into(), Value::from(chunk.tenant_id.clone()));
        metadata.insert("indexed_at".into(), Value::from(chunk.indexed_at.to_rfc3339()));

        let record = Self {
            id: chunk.id.clone(),
            document: chunk.text.clone(),
            metadata,
        };
        record.into_mode(mode)
    }

    /// Convert to the representation a store expects.
    pub fn into_mode(mut self, mode: MetadataMode) -> Self {
        if mode == MetadataMode::Flat {
            self.metadata = flatten_metadata(&self.metadata);
        }
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }
}

pub fn flatten_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in metadata {
        match value {
            Value::Null => {}
            Value::Object(_) => {
                flat.insert(format!("{key}_json"), Value::String(value.to_string()));
            }
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                    flat.insert(key.clone(), Value::String(joined.join(", ")));
                } else {
                    flat.insert(format!("{key}_json"), Value::String(value.to_string()));
                }
            }
            scalar => {
                flat.insert(key.clone(), scalar.clone());
            }
        }
    }
    flat
}
