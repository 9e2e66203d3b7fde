//! Core data models shared by analysis, chunking, indexing, and retrieval.
//!
//! A [`Document`] arrives from a connector with raw content and
//! [`DocumentMetadata`]. The analyzer may attach an [`Enrichment`] and an
//! [`Integration`] annotation; the chunker then splits it into [`Chunk`]s
//! that inherit the document's metadata.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Stable identifier of a document within a tenant.
pub type DocumentId = String;

/// Kind of artifact a document was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Code,
    #[serde(alias = "docs", alias = "markdown")]
    Documentation,
    #[serde(alias = "chat", alias = "slack", alias = "discord")]
    Conversation,
    #[serde(alias = "issue", alias = "jira")]
    Ticket,
    #[serde(alias = "pr", alias = "merge_request")]
    PullRequest,
    TicketComment,
    PrReview,
    PrComment,
}

impl SourceType {
    pub const ALL: [SourceType; 8] = [
        SourceType::Code,
        SourceType::Documentation,
        SourceType::Conversation,
        SourceType::Ticket,
        SourceType::PullRequest,
        SourceType::TicketComment,
        SourceType::PrReview,
        SourceType::PrComment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Code => "code",
            SourceType::Documentation => "documentation",
            SourceType::Conversation => "conversation",
            SourceType::Ticket => "ticket",
            SourceType::PullRequest => "pull_request",
            SourceType::TicketComment => "ticket_comment",
            SourceType::PrReview => "pr_review",
            SourceType::PrComment => "pr_comment",
        }
    }

    /// Parse a source type name, accepting the same aliases as deserialization.
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.trim().to_lowercase())).ok()
    }

    /// Ticket-like sources: tickets, pull requests, and their comment threads.
    pub fn is_ticket_like(&self) -> bool {
        matches!(
            self,
            SourceType::Ticket
                | SourceType::PullRequest
                | SourceType::TicketComment
                | SourceType::PrReview
                | SourceType::PrComment
        )
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector-supplied metadata for a document.
///
/// `tenant_id` is required by the ingress contract; it defaults to empty on
/// deserialization so that a missing value is reported per document instead
/// of failing the whole input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub is_demo: bool,
    #[serde(default)]
    pub tenant_id: String,
    /// Connector-specific fields, carried through to chunk metadata.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    pub fn new(source_type: SourceType, tenant_id: impl Into<String>) -> Self {
        Self {
            source_type,
            file_path: None,
            name: None,
            description: None,
            created_at: None,
            modified_at: None,
            is_demo: false,
            tenant_id: tenant_id.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Most recent known timestamp: `modified_at`, falling back to `created_at`.
    pub fn last_touched(&self) -> Option<DateTime<Utc>> {
        self.modified_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.created_at.as_deref().and_then(parse_timestamp))
    }
}

/// Parse RFC 3339, naive ISO-8601 date-times (assumed UTC), or plain dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Rough complexity tier used to scale chunk budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Simple => "simple",
            ComplexityTier::Moderate => "moderate",
            ComplexityTier::Complex => "complex",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Maintainability {
    pub has_docs: bool,
    pub comment_ratio: f64,
    pub long_lines: usize,
    pub avg_line_length: f64,
}

/// Heuristic classification attached to a document before chunking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub purpose: String,
    pub category: String,
    #[serde(default)]
    pub complexity: ComplexityTier,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub maintainability: Maintainability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Supports,
    Extends,
    Explains,
    Tests,
    Contradicts,
    References,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 6] = [
        RelationshipType::Supports,
        RelationshipType::Extends,
        RelationshipType::Explains,
        RelationshipType::Tests,
        RelationshipType::Contradicts,
        RelationshipType::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Supports => "supports",
            RelationshipType::Extends => "extends",
            RelationshipType::Explains => "explains",
            RelationshipType::Tests => "tests",
            RelationshipType::Contradicts => "contradicts",
            RelationshipType::References => "references",
        }
    }

    /// Fixed confidence assigned to every inferred edge of this type.
    pub fn confidence(&self) -> f64 {
        match self {
            RelationshipType::Supports => 0.8,
            RelationshipType::Extends => 0.85,
            RelationshipType::Explains => 0.75,
            RelationshipType::Tests => 0.9,
            RelationshipType::Contradicts => 0.7,
            RelationshipType::References => 0.6,
        }
    }
}

/// A directed edge from the annotated document to another document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub target: DocumentId,
    pub confidence: f64,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    StaleContent,
    MissingDocumentation,
    BrokenLinks,
    VersionMismatch,
    IncompleteImplementation,
    SecurityRisk,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::StaleContent => "stale_content",
            IssueType::MissingDocumentation => "missing_documentation",
            IssueType::BrokenLinks => "broken_links",
            IssueType::VersionMismatch => "version_mismatch",
            IssueType::IncompleteImplementation => "incomplete_implementation",
            IssueType::SecurityRisk => "security_risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub severity: Severity,
    pub description: String,
    pub suggestion: String,
}

/// The four weighted components of an integration quality score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub freshness: f64,
    pub cross_reference: f64,
    pub completeness: f64,
    pub consistency: f64,
}

impl QualityBreakdown {
    pub const FRESHNESS_WEIGHT: f64 = 0.3;
    pub const CROSS_REFERENCE_WEIGHT: f64 = 0.3;
    pub const COMPLETENESS_WEIGHT: f64 = 0.2;
    pub const CONSISTENCY_WEIGHT: f64 = 0.2;

    /// Weighted sum, clamped to `[0, 1]`.
    pub fn score(&self) -> f64 {
        let raw = self.freshness * Self::FRESHNESS_WEIGHT
            + self.cross_reference * Self::CROSS_REFERENCE_WEIGHT
            + self.completeness * Self::COMPLETENESS_WEIGHT
            + self.consistency * Self::CONSISTENCY_WEIGHT;
        raw.clamp(0.0, 1.0)
    }
}

/// Corpus-level annotation produced by the integration analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub quality_score: f64,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub semantic_context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<QualityBreakdown>,
}

impl Integration {
    pub fn high_severity_issues(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::High)
            .count()
    }
}

/// Unit of ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,
}

impl Document {
    pub fn new(
        content: impl Into<String>,
        source_type: SourceType,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata::new(source_type, tenant_id),
            enrichment: None,
            integration: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.metadata.file_path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.metadata.modified_at = Some(at.to_rfc3339());
        self
    }

    pub fn source_type(&self) -> SourceType {
        self.metadata.source_type
    }

    /// Stable id: file path, then name, then a content hash.
    pub fn id(&self) -> DocumentId {
        if let Some(path) = non_empty(self.metadata.file_path.as_deref()) {
            return path.to_string();
        }
        if let Some(name) = non_empty(self.metadata.name.as_deref()) {
            return name.to_string();
        }
        let digest = Sha256::digest(self.content.as_bytes());
        format!("doc-{}", &format!("{:x}", digest)[..12])
    }

    /// Human-readable label: name, then file name, then the id.
    pub fn display_name(&self) -> String {
        if let Some(name) = non_empty(self.metadata.name.as_deref()) {
            return name.to_string();
        }
        if let Some(path) = non_empty(self.metadata.file_path.as_deref()) {
            return path.rsplit('/').next().unwrap_or(path).to_string();
        }
        self.id()
    }

    /// Quality used for admission; documents without an integration
    /// annotation are never rejected on quality.
    pub fn quality_score(&self) -> f64 {
        self.integration
            .as_ref()
            .map(|i| i.quality_score)
            .unwrap_or(1.0)
    }

    pub fn high_severity_issues(&self) -> usize {
        self.integration
            .as_ref()
            .map(Integration::high_severity_issues)
            .unwrap_or(0)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Code,
    Documentation,
    Conversation,
    Text,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Code => "code",
            ChunkType::Documentation => "documentation",
            ChunkType::Conversation => "conversation",
            ChunkType::Text => "text",
        }
    }
}

/// A contiguous piece of a document, sized for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from content, source, position, and tenant.
    pub id: String,
    pub document_id: DocumentId,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub token_count: usize,
    pub chunk_type: ChunkType,
    pub tenant_id: String,
    pub indexed_at: DateTime<Utc>,
    /// Metadata inherited from the parent document; may be nested.
    pub metadata: Map<String, Value>,
}
