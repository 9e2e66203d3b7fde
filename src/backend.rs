//! Store backend selection and manager construction.

use std::sync::Arc;

use anyhow::{bail, Result};

use corpus_index_core::manager::VectorStoreManager;
use corpus_index_core::store::memory::InMemoryBackend;
use corpus_index_core::store::StoreBackend;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteBackend;

pub fn create_backend(config: &Config) -> Result<Arc<dyn StoreBackend>> {
    match config.store.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteBackend)),
        // Process-local; nothing survives the command.
        "memory" => Ok(Arc::new(InMemoryBackend::new())),
        other => bail!("Unknown store backend: {}", other),
    }
}

/// Manager over `[store].root` with the configured backend and embedder.
pub fn open_manager(config: &Config) -> Result<Arc<VectorStoreManager>> {
    let backend = create_backend(config)?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(Arc::new(
        VectorStoreManager::new(config.store.root.clone(), backend, embedder)
            .with_op_timeout(config.op_timeout()),
    ))
}
