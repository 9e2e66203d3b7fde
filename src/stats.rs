//! Collection statistics and health for one tenant.
//!
//! `cix stats` prints a table of the tenant's collections; `cix health`
//! prints the health report as JSON and fails when the store cannot be
//! reached.

use anyhow::Result;
use serde_json::Value;

use corpus_index_core::manager::{HealthReport, HealthStatus};
use corpus_index_core::tenant::TenantId;

use crate::backend::open_manager;
use crate::config::Config;
use crate::db;

/// Print per-collection counts and creation metadata.
pub async fn run_stats(config: &Config, tenant: &TenantId) -> Result<()> {
    let manager = open_manager(config)?;
    let stats = manager.stats(tenant).await?;
    let total: u64 = stats.values().map(|s| s.count).sum();

    let root = manager.tenant_root(tenant);
    let db_size = std::fs::metadata(db::db_path(&root))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Corpus Index: Tenant Stats");
    println!("===========================");
    println!();
    println!("  Tenant:      {}", tenant);
    println!("  Store:       {} ({})", root.display(), config.store.backend);
    if config.store.backend == "sqlite" {
        println!("  Size:        {}", format_bytes(db_size));
    }
    println!("  Collections: {}", stats.len());
    println!("  Chunks:      {}", total);

    if !stats.is_empty() {
        println!();
        println!(
            "  {:<36} {:>8}   {:<24} {}",
            "COLLECTION", "CHUNKS", "MODEL", "CREATED"
        );
        println!("  {}", "-".repeat(90));
        for (name, s) in &stats {
            let model = s
                .metadata
                .get("embedding_model")
                .and_then(Value::as_str)
                .unwrap_or("-");
            let created = s
                .metadata
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or("-");
            println!("  {:<36} {:>8}   {:<24} {}", name, s.count, model, created);
        }
    }
    println!();
    Ok(())
}

/// Print the health report; an unreachable store is an error exit.
pub async fn run_health(config: &Config, tenant: &TenantId) -> Result<HealthReport> {
    let manager = open_manager(config)?;
    let report = manager.health_check(tenant).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status == HealthStatus::Error {
        anyhow::bail!(
            "store for tenant '{}' is unhealthy: {}",
            tenant,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(report)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
