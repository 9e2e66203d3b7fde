//! Document ingress for the `index` and `analyze` commands.
//!
//! Input files hold connector output: either a JSON array of documents or
//! one document per line (JSONL). Lines that fail to parse are reported on
//! stderr and skipped; the rest of the file is still processed.
//!
//! Reports are printed to stdout as pretty JSON; logs go to stderr.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use corpus_index_core::analysis::Analyzer;
use corpus_index_core::indexer::{CancelFlag, IndexReport, Indexer};
use corpus_index_core::models::Document;
use corpus_index_core::tenant::TenantId;

use crate::backend::open_manager;
use crate::config::Config;

/// Parse a JSON array or JSONL file into documents.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents: {}", path.display()))?;
    parse_documents(&content).with_context(|| format!("Invalid document file: {}", path.display()))
}

pub fn parse_documents(content: &str) -> Result<Vec<Document>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut docs = Vec::new();
    let mut bad = 0usize;
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(line) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                bad += 1;
                warn!(line = lineno + 1, error = %e, "skipping unparseable document");
            }
        }
    }
    if docs.is_empty() && bad > 0 {
        bail!("no line could be parsed as a document ({} failed)", bad);
    }
    Ok(docs)
}

/// Run `add_documents` for one tenant and print the report.
pub async fn run_index(
    config: &Config,
    path: &Path,
    category: &str,
    tenant: TenantId,
    batch_size: Option<usize>,
    threshold: Option<f64>,
) -> Result<IndexReport> {
    let documents = load_documents(path)?;
    let mut indexer_config = config.indexer_config();
    if let Some(t) = threshold {
        indexer_config.quality_threshold = t;
    }
    indexer_config.validate()?;

    let manager = open_manager(config)?;
    let tenant = config.tenant(tenant);
    let indexer = Indexer::new(manager, indexer_config);

    // Ctrl-C stops the run between batches; batches already written stay.
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    let report = indexer
        .add_documents_with_cancel(&tenant, documents, category, batch_size, &cancel)
        .await
        .with_context(|| format!("indexing into '{}' failed", category))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

/// Analyze a batch without writing and print the summary.
pub fn run_analyze(path: &Path) -> Result<()> {
    let documents = load_documents(path)?;
    info!(documents = documents.len(), "analyzing batch");
    let outcome = Analyzer::new().analyze(documents);

    let per_document: Vec<serde_json::Value> = outcome
        .documents
        .iter()
        .map(|d| {
            serde_json::json!({
                "document_id": d.id(),
                "quality_score": d.quality_score(),
                "issues": d.integration.as_ref().map(|i| i.issues.len()).unwrap_or(0),
                "relationships": d.integration.as_ref().map(|i| i.relationships.len()).unwrap_or(0),
            })
        })
        .collect();

    let out = serde_json::json!({
        "summary": outcome.summary,
        "documents": per_document,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
