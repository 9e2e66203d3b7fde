//! Content-aware chunking.
//!
//! Splits a [`Document`] into [`Chunk`]s with a strategy chosen by source
//! type:
//!
//! | Source | Strategy | Chunk type |
//! |--------|----------|------------|
//! | code | definition-aligned packing, line fallback, line overlap | `code` |
//! | documentation | header sections, token windows for large sections | `documentation` |
//! | conversation | message packing, burst-gap boundaries | `conversation` |
//! | everything else | token windows with overlap | `text` |
//!
//! Token counts use a 4 chars/token estimate. For code, the budget is scaled
//! by the document's complexity tier (simple x0.5, complex x1.5).
//!
//! Chunk ids are SHA-256 digests of `(text, source path, index, tenant)`, so
//! re-chunking unchanged input yields the same ids and the same content in
//! different tenants never collides.
//!
//! ```rust
//! use corpus_index_core::chunk::{chunk_document, ChunkingParams};
//! use corpus_index_core::models::{ChunkType, Document, SourceType};
//! use corpus_index_core::tenant::TenantId;
//!
//! let doc = Document::new("# Title\n\nBody text.", SourceType::Documentation, "demo");
//! let chunks = chunk_document(&doc, &TenantId::Demo, &ChunkingParams::default(), chrono::Utc::now());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_type, ChunkType::Documentation);
//! ```

pub mod code;
pub mod conversation;
pub mod markdown;
pub mod text;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkType, ComplexityTier, Document, SourceType};
use crate::tenant::TenantId;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingParams {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub code_overlap_lines: usize,
    pub conversation_gap_minutes: i64,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 50,
            code_overlap_lines: 2,
            conversation_gap_minutes: 30,
        }
    }
}

/// Token budget adjusted for complexity.
pub fn effective_budget(max_tokens: usize, tier: ComplexityTier) -> usize {
    match tier {
        ComplexityTier::Simple => (max_tokens / 2).max(1),
        ComplexityTier::Moderate => max_tokens,
        ComplexityTier::Complex => max_tokens + max_tokens / 2,
    }
}

/// Split a document's content into raw chunk texts.
pub fn split_document(doc: &Document, params: &ChunkingParams) -> (ChunkType, Vec<String>) {
    let content = doc.content.as_str();
    match doc.source_type() {
        SourceType::Code => {
            let tier = doc
                .enrichment
                .as_ref()
                .map(|e| e.complexity)
                .unwrap_or_default();
            let budget = effective_budget(params.max_tokens, tier);
            (
                ChunkType::Code,
                code::split_code(content, budget, params.code_overlap_lines),
            )
        }
        SourceType::Documentation => (
            ChunkType::Documentation,
            markdown::split_markdown(content, params.max_tokens, params.overlap_tokens),
        ),
        SourceType::Conversation => (
            ChunkType::Conversation,
            conversation::split_conversation(
                content,
                params.max_tokens,
                params.overlap_tokens,
                params.conversation_gap_minutes,
            ),
        ),
        _ => (
            ChunkType::Text,
            text::split_text(content, params.max_tokens, params.overlap_tokens),
        ),
    }
}

/// Deterministic chunk id.
pub fn chunk_id(text: &str, source_path: &str, chunk_index: usize, tenant_id: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [text, source_path, &chunk_index.to_string(), tenant_id] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// Metadata every chunk of `doc` inherits.
pub fn inherited_metadata(doc: &Document, tenant: &TenantId) -> Map<String, Value> {
    let meta = &doc.metadata;
    let mut m = Map::new();

    for (k, v) in &meta.extra {
        m.insert(k.clone(), v.clone());
    }

    m.insert("source_type".into(), json!(meta.source_type.as_str()));
    m.insert("document_id".into(), json!(doc.id()));
    if let Some(path) = &meta.file_path {
        m.insert("file_path".into(), json!(path));
    }
    m.insert("name".into(), json!(doc.display_name()));
    if let Some(desc) = &meta.description {
        m.insert("description".into(), json!(desc));
    }
    if let Some(at) = &meta.created_at {
        m.insert("created_at".into(), json!(at));
    }
    if let Some(at) = &meta.modified_at {
        m.insert("modified_at".into(), json!(at));
    }
    m.insert("tenant_id".into(), json!(tenant.as_str()));
    m.insert("demo_mode".into(), json!(tenant.is_demo()));
    m.insert("is_demo".into(), json!(meta.is_demo || tenant.is_demo()));

    match &doc.integration {
        Some(integration) => {
            m.insert("integration_quality".into(), json!(integration.quality_score));
            m.insert(
                "relationship_count".into(),
                json!(integration.relationships.len()),
            );
            let mut kinds: Vec<&str> = integration
                .relationships
                .iter()
                .map(|r| r.kind.as_str())
                .collect();
            kinds.sort_unstable();
            kinds.dedup();
            m.insert("relationship_types".into(), json!(kinds));
            m.insert("relationships".into(), json!(integration.relationships));
            m.insert("issue_count".into(), json!(integration.issues.len()));
            m.insert(
                "high_severity_issues".into(),
                json!(integration.high_severity_issues()),
            );
            let issue_types: Vec<&str> = integration.issues.iter().map(|i| i.kind.as_str()).collect();
            m.insert("issue_types".into(), json!(issue_types));
            m.insert(
                "semantic_context".into(),
                Value::Object(integration.semantic_context.clone()),
            );
        }
        None => {
            m.insert("integration_quality".into(), json!(doc.quality_score()));
            m.insert("relationship_count".into(), json!(0));
            m.insert("issue_count".into(), json!(0));
            m.insert("high_severity_issues".into(), json!(0));
        }
    }

    match &doc.enrichment {
        Some(e) => {
            m.insert("has_enrichment".into(), json!(true));
            m.insert("purpose".into(), json!(e.purpose));
            m.insert("content_category".into(), json!(e.category));
            m.insert("complexity".into(), json!(e.complexity.as_str()));
            m.insert("frameworks".into(), json!(e.frameworks));
            m.insert("patterns".into(), json!(e.patterns));
            m.insert("maintainability".into(), json!(e.maintainability));
        }
        None => {
            m.insert("has_enrichment".into(), json!(false));
        }
    }

    m
}

/// Split a document and wrap each piece as a [`Chunk`].
pub fn chunk_document(
    doc: &Document,
    tenant: &TenantId,
    params: &ChunkingParams,
    indexed_at: DateTime<Utc>,
) -> Vec<Chunk> {
    let (chunk_type, pieces) = split_document(doc, params);
    let document_id = doc.id();
    let metadata = inherited_metadata(doc, tenant);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            id: chunk_id(&text, &document_id, index, tenant.as_str()),
            document_id: document_id.clone(),
            token_count: estimate_tokens(&text),
            text,
            chunk_index: index,
            total_chunks: total,
            chunk_type,
            tenant_id: tenant.as_str().to_string(),
            indexed_at,
            metadata: metadata.clone(),
        })
        .collect()
}
