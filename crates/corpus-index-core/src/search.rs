//! Tenant-scoped semantic retrieval.
//!
//! The query is embedded with the deployment's [`Embedder`](crate::embedding::Embedder)
//! and matched against one collection of the calling tenant. The store is
//! always queried through a [`ScopedFilter`] built from that tenant, so
//! results from other tenants cannot appear even if a collection were
//! shared. Optional filters narrow by source type and minimum quality.
//!
//! Results come back column-wise (`ids`, `documents`, `metadatas`,
//! `distances`), nearest first, with an [`AggregateAnalysis`] over the
//! returned metadata.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{with_timeout, Result};
use crate::manager::VectorStoreManager;
use crate::models::SourceType;
use crate::store::ScopedFilter;
use crate::tenant::{Category, TenantId};

#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub category: &'a str,
    pub n_results: usize,
    /// Only return chunks whose `integration_quality` is at least this.
    pub quality_threshold: Option<f64>,
    pub source_type: Option<SourceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateAnalysis {
    pub total_results: usize,
    pub source_types: BTreeMap<String, usize>,
    /// Buckets: `high` (>= 0.8), `good` (>= 0.6), `fair` (>= 0.4), `poor`, `unknown`.
    pub quality_distribution: BTreeMap<String, usize>,
    pub purposes: BTreeMap<String, usize>,
    pub enriched_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_quality: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Map<String, Value>>,
    pub distances: Vec<f32>,
    pub aggregate_analysis: AggregateAnalysis,
}

impl SearchResponse {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub fn quality_bucket(score: Option<f64>) -> &'static str {
    match score {
        None => "unknown",
        Some(s) if s >= 0.8 => "high",
        Some(s) if s >= 0.6 => "good",
        Some(s) if s >= 0.4 => "fair",
        Some(_) => "poor",
    }
}

pub fn aggregate(metadatas: &[Map<String, Value>]) -> AggregateAnalysis {
    let mut agg = AggregateAnalysis {
        total_results: metadatas.len(),
        ..Default::default()
    };
    let mut quality_sum = 0.0;
    let mut quality_n = 0usize;

    for m in metadatas {
        let source = m
            .get("source_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        *agg.source_types.entry(source.to_string()).or_default() += 1;

        let quality = m.get("integration_quality").and_then(Value::as_f64);
        if let Some(q) = quality {
            quality_sum += q;
            quality_n += 1;
        }
        *agg
            .quality_distribution
            .entry(quality_bucket(quality).to_string())
            .or_default() += 1;

        if let Some(purpose) = m.get("purpose").and_then(Value::as_str) {
            *agg.purposes.entry(purpose.to_string()).or_default() += 1;
        }
        if m.get("has_enrichment").and_then(Value::as_bool) == Some(true) {
            agg.enriched_count += 1;
        }
    }

    if quality_n > 0 {
        agg.average_quality = Some(quality_sum / quality_n as f64);
    }
    agg
}

/// Query one of the tenant's collections.
///
/// Empty queries, `n_results == 0`, and missing collections return an empty
/// response. An unknown category is an error.
pub async fn search(
    manager: &VectorStoreManager,
    tenant: &TenantId,
    req: &SearchRequest<'_>,
) -> Result<SearchResponse> {
    let category: Category = req.category.parse()?;
    if req.query.trim().is_empty() || req.n_results == 0 {
        return Ok(SearchResponse::default());
    }

    let Some(collection) = manager.get_collection(tenant, category).await? else {
        return Ok(SearchResponse::default());
    };

    let mut embedded = manager
        .embedder()
        .embed(&[req.query.to_string()])
        .await?;
    let Some(query_vec) = embedded.pop() else {
        return Ok(SearchResponse::default());
    };

    let mut filter = ScopedFilter::for_tenant(tenant);
    if let Some(source) = req.source_type {
        filter = filter.and_equals("source_type", source.as_str());
    }
    if let Some(min) = req.quality_threshold {
        filter = filter.and_at_least("integration_quality", min);
    }

    let hits = with_timeout(
        manager.op_timeout(),
        collection
            .store()
            .query(&collection.name, &query_vec, req.n_results, &filter),
    )
    .await?;

    let mut resp = SearchResponse::default();
    for hit in hits {
        resp.ids.push(hit.id);
        resp.documents.push(hit.document);
        resp.metadatas.push(hit.metadata);
        resp.distances.push(hit.distance);
    }
    resp.aggregate_analysis = aggregate(&resp.metadatas);
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quality_buckets() {
        assert_eq!(quality_bucket(Some(0.85)), "high");
        assert_eq!(quality_bucket(Some(0.6)), "good");
        assert_eq!(quality_bucket(Some(0.45)), "fair");
        assert_eq!(quality_bucket(Some(0.1)), "poor");
        assert_eq!(quality_bucket(None), "unknown");
    }

    #[test]
    fn test_aggregate_counts() {
        let metas: Vec<Map<String, Value>> = vec![
            json!({"source_type": "code", "integration_quality": 0.9, "purpose": "api_endpoint", "has_enrichment": true}),
            json!({"source_type": "code", "integration_quality": 0.5, "has_enrichment": false}),
            json!({"source_type": "conversation"}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();

        let agg = aggregate(&metas);
        assert_eq!(agg.total_results, 3);
        assert_eq!(agg.source_types["code"], 2);
        assert_eq!(agg.quality_distribution["high"], 1);
        assert_eq!(agg.quality_distribution["fair"], 1);
        assert_eq!(agg.quality_distribution["unknown"], 1);
        assert_eq!(agg.purposes["api_endpoint"], 1);
        assert_eq!(agg.enriched_count, 1);
        assert!((agg.average_quality.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty() {
        let agg = aggregate(&[]);
        assert_eq!(agg.total_results, 0);
        assert!(agg.average_quality.is_none());
    }
}
