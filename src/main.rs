//! # Corpus Index CLI (`cix`)
//!
//! Operational front end for the indexing pipeline: index a batch of
//! connector documents for a tenant, analyze a batch without writing,
//! search, inspect, and administer tenant collections.
//!
//! ## Usage
//!
//! ```bash
//! cix --config ./config/cix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cix index <file>` | Index a JSON/JSONL document batch into one collection |
//! | `cix analyze <file>` | Print quality analysis for a batch without writing |
//! | `cix search "<query>"` | Tenant-scoped semantic search |
//! | `cix stats` | Per-collection counts for a tenant |
//! | `cix health` | Health report for a tenant's store |
//! | `cix admin ...` | Reset, delete, backup and restore (explicit tenant only) |
//!
//! Reports go to stdout; logs go to stderr (`RUST_LOG`, default `info`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corpus_index::{admin, config, ingest, search, stats};
use corpus_index_core::tenant::{resolve_tenant, TenantId};

/// Corpus Index CLI: multi-tenant, quality-aware document indexing.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cix",
    about = "Corpus Index: multi-tenant, quality-aware document indexing for retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Request identity. Only an authenticated user with an organization id is
/// routed to that organization; everything else lands in the demo tenant.
#[derive(Args, Debug, Clone)]
struct RequestTenant {
    /// Organization id of the caller.
    #[arg(long)]
    org: Option<String>,

    /// Authenticated user id of the caller.
    #[arg(long)]
    user: Option<String>,
}

impl RequestTenant {
    fn resolve(&self) -> Result<TenantId> {
        Ok(resolve_tenant(self.user.as_deref(), self.org.as_deref())?)
    }
}

/// Explicit tenant selection for operator commands.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct TargetTenant {
    /// Organization to act on.
    #[arg(long)]
    org: Option<String>,

    /// Act on the shared demo tenant.
    #[arg(long)]
    demo: bool,
}

impl TargetTenant {
    fn resolve(&self) -> Result<TenantId> {
        match &self.org {
            Some(org) => Ok(TenantId::organization(org)?),
            None => Ok(TenantId::Demo),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a batch of documents into one of the tenant's collections.
    ///
    /// Documents are analyzed as a batch, filtered by quality, chunked,
    /// embedded and written. The run report is printed as JSON.
    Index {
        /// JSON array or JSONL file of documents.
        file: PathBuf,

        /// Collection category: main, code, documentation, conversations,
        /// pull_requests, tickets.
        #[arg(long)]
        category: String,

        #[command(flatten)]
        tenant: RequestTenant,

        /// Chunks per write batch (overrides `[indexing].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Minimum quality score (overrides `[indexing].quality_threshold`).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run quality analysis over a batch and print the summary.
    Analyze {
        /// JSON array or JSONL file of documents.
        file: PathBuf,
    },

    /// Search one of the tenant's collections.
    Search {
        /// The search query string.
        query: String,

        #[arg(long, default_value = "main")]
        category: String,

        #[command(flatten)]
        tenant: RequestTenant,

        /// Maximum number of results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only return chunks with at least this integration quality.
        #[arg(long)]
        min_quality: Option<f64>,

        /// Only return chunks of this source type (e.g. `code`, `slack`).
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Show per-collection counts for a tenant.
    Stats {
        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Check a tenant's store.
    Health {
        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Administrative operations on one tenant.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Drop one collection.
    ResetCollection {
        #[arg(long)]
        category: String,

        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Remove every chunk of one document.
    DeleteDocument {
        /// Document id (file path, name, or `doc-<hash>`).
        document_id: String,

        #[arg(long)]
        category: String,

        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Drop every collection of the tenant.
    DeleteTenant {
        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Write the tenant's collections to a JSON file.
    Backup {
        path: PathBuf,

        #[command(flatten)]
        tenant: TargetTenant,
    },

    /// Load a backup into the tenant's store.
    Restore {
        path: PathBuf,

        #[command(flatten)]
        tenant: TargetTenant,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index {
            file,
            category,
            tenant,
            batch_size,
            threshold,
        } => {
            let report = ingest::run_index(
                &cfg,
                &file,
                &category,
                tenant.resolve()?,
                batch_size,
                threshold,
            )
            .await?;
            if !report.success {
                anyhow::bail!(
                    "indexing run {} incomplete: {} failed batch(es){}",
                    report.run_id,
                    report.failed_batches.len(),
                    if report.cancelled { ", cancelled" } else { "" }
                );
            }
        }
        Commands::Analyze { file } => {
            ingest::run_analyze(&file)?;
        }
        Commands::Search {
            query,
            category,
            tenant,
            limit,
            min_quality,
            source_type,
        } => {
            let opts = search::SearchOptions {
                category,
                limit,
                min_quality,
                source_type,
            };
            search::run_search(&cfg, &query, &tenant.resolve()?, &opts).await?;
        }
        Commands::Stats { tenant } => {
            stats::run_stats(&cfg, &tenant.resolve()?).await?;
        }
        Commands::Health { tenant } => {
            stats::run_health(&cfg, &tenant.resolve()?).await?;
        }
        Commands::Admin { action } => match action {
            AdminAction::ResetCollection { category, tenant } => {
                admin::reset_collection(&cfg, &tenant.resolve()?, &category).await?;
            }
            AdminAction::DeleteDocument {
                document_id,
                category,
                tenant,
            } => {
                admin::delete_document(&cfg, &tenant.resolve()?, &category, &document_id).await?;
            }
            AdminAction::DeleteTenant { tenant } => {
                admin::delete_tenant(&cfg, &tenant.resolve()?).await?;
            }
            AdminAction::Backup { path, tenant } => {
                admin::backup(&cfg, &tenant.resolve()?, &path).await?;
            }
            AdminAction::Restore { path, tenant } => {
                admin::restore(&cfg, &tenant.resolve()?, &path).await?;
            }
        },
    }

    Ok(())
}
