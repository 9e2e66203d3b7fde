//! `cix search`: tenant-scoped retrieval from the command line.

use anyhow::{Context, Result};

use corpus_index_core::models::SourceType;
use corpus_index_core::search::{search, SearchRequest, SearchResponse};
use corpus_index_core::tenant::TenantId;

use crate::backend::open_manager;
use crate::config::Config;

/// Options for one search invocation.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub category: String,
    pub limit: Option<usize>,
    pub min_quality: Option<f64>,
    pub source_type: Option<String>,
}

pub async fn run_search(
    config: &Config,
    query: &str,
    tenant: &TenantId,
    opts: &SearchOptions,
) -> Result<SearchResponse> {
    let source_type = match opts.source_type.as_deref() {
        Some(raw) => Some(
            SourceType::parse(raw).with_context(|| format!("Unknown source type: '{}'", raw))?,
        ),
        None => None,
    };
    if let Some(q) = opts.min_quality {
        if !(0.0..=1.0).contains(&q) {
            anyhow::bail!("--min-quality must be within [0, 1]");
        }
    }

    let manager = open_manager(config)?;
    let request = SearchRequest {
        query,
        category: &opts.category,
        n_results: opts.limit.unwrap_or(config.retrieval.default_n_results),
        quality_threshold: opts.min_quality,
        source_type,
    };
    let response = search(&manager, tenant, &request).await?;

    if response.is_empty() {
        eprintln!("No results.");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response)
}
