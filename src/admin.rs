//! Destructive and bulk operations on a single tenant.
//!
//! Every command here acts on exactly one explicitly named tenant.

use std::path::Path;

use anyhow::{Context, Result};

use corpus_index_core::tenant::{Category, TenantId};

use crate::backend::open_manager;
use crate::config::Config;

pub async fn reset_collection(config: &Config, tenant: &TenantId, category: &str) -> Result<bool> {
    let category: Category = category.parse()?;
    let manager = open_manager(config)?;
    let existed = manager.reset_collection(tenant, category).await?;
    let name = tenant.collection_name(category);
    if existed {
        println!("Dropped collection {}.", name);
    } else {
        println!("Collection {} did not exist.", name);
    }
    Ok(existed)
}

pub async fn delete_document(
    config: &Config,
    tenant: &TenantId,
    category: &str,
    document_id: &str,
) -> Result<u64> {
    let category: Category = category.parse()?;
    let manager = open_manager(config)?;
    let removed = manager
        .delete_document(tenant, category, document_id)
        .await?;
    println!(
        "Removed {} chunk(s) of {} from {}.",
        removed,
        document_id,
        tenant.collection_name(category)
    );
    Ok(removed)
}

pub async fn delete_tenant(config: &Config, tenant: &TenantId) -> Result<usize> {
    let manager = open_manager(config)?;
    let dropped = manager.delete_all_for_tenant(tenant).await?;
    println!("Dropped {} collection(s) for tenant {}.", dropped, tenant);
    Ok(dropped)
}

pub async fn backup(config: &Config, tenant: &TenantId, path: &Path) -> Result<()> {
    let manager = open_manager(config)?;
    let report = manager
        .backup(tenant, path)
        .await
        .with_context(|| format!("backup of tenant '{}' failed", tenant))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn restore(config: &Config, tenant: &TenantId, path: &Path) -> Result<()> {
    let manager = open_manager(config)?;
    let report = manager
        .restore(tenant, path)
        .await
        .with_context(|| format!("restore into tenant '{}' failed", tenant))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
