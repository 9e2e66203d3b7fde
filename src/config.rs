//! TOML configuration for the `cix` binary.
//!
//! Every section except `[store]` may be omitted; defaults match the
//! library defaults. [`load_config`] parses and validates the whole file
//! before anything is opened.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use corpus_index_core::chunk::ChunkingParams;
use corpus_index_core::indexer::IndexerConfig;
use corpus_index_core::tenant::{Tenant, TenantId, TenantQuota};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    /// Per-organization quotas keyed by org id.
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantQuota>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_op_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    #[serde(default = "default_code_overlap_lines")]
    pub code_overlap_lines: usize,
    #[serde(default = "default_gap_minutes")]
    pub conversation_gap_minutes: i64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            code_overlap_lines: default_code_overlap_lines(),
            conversation_gap_minutes: default_gap_minutes(),
        }
    }
}

fn default_max_tokens() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}
fn default_code_overlap_lines() -> usize {
    2
}
fn default_gap_minutes() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_true")]
    pub filter_high_severity: bool,
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub analyze: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            filter_high_severity: true,
            batch_size: default_index_batch_size(),
            batch_timeout_secs: default_batch_timeout_secs(),
            analyze: true,
        }
    }
}

fn default_quality_threshold() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_index_batch_size() -> usize {
    100
}
fn default_batch_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub default_n_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_n_results: default_n_results(),
        }
    }
}

fn default_n_results() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama`; overrides the public endpoint for `openai`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TenancyConfig {
    /// Quota for organizations without their own `[tenants.<id>]` entry.
    #[serde(default)]
    pub default_quota: TenantQuota,
}

impl Config {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.store.op_timeout_secs)
    }

    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            max_tokens: self.chunking.max_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
            code_overlap_lines: self.chunking.code_overlap_lines,
            conversation_gap_minutes: self.chunking.conversation_gap_minutes,
        }
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            quality_threshold: self.indexing.quality_threshold,
            filter_high_severity: self.indexing.filter_high_severity,
            batch_size: self.indexing.batch_size,
            batch_timeout: Duration::from_secs(self.indexing.batch_timeout_secs),
            analyze: self.indexing.analyze,
            chunking: self.chunking_params(),
        }
    }

    /// Tenant with its configured quota. The demo tenant never has one.
    pub fn tenant(&self, id: TenantId) -> Tenant {
        let quota = match &id {
            TenantId::Demo => TenantQuota::default(),
            TenantId::Organization(org) => self
                .tenants
                .get(org)
                .cloned()
                .unwrap_or_else(|| self.tenancy.default_quota.clone()),
        };
        Tenant::new(id, quota)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }
    if config.store.op_timeout_secs == 0 {
        anyhow::bail!("store.op_timeout_secs must be > 0");
    }

    if config.chunking.conversation_gap_minutes <= 0 {
        anyhow::bail!("chunking.conversation_gap_minutes must be > 0");
    }
    // Threshold, batch size, budget and overlap rules live with the indexer.
    config.indexer_config().validate()?;

    if config.retrieval.default_n_results < 1 {
        anyhow::bail!("retrieval.default_n_results must be >= 1");
    }

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "hashing" => {
            if embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0");
            }
        }
        "openai" | "ollama" => {
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.batch_size == 0 {
                anyhow::bail!("embedding.batch_size must be > 0");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, or ollama.",
            other
        ),
    }

    for org in config.tenants.keys() {
        TenantId::organization(org)
            .with_context(|| format!("invalid [tenants.{}] entry", org))?;
    }

    Ok(())
}
