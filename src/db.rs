use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file inside each tenant store root.
pub const DB_FILE: &str = "index.sqlite";

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

pub async fn connect(root: &Path) -> Result<SqlitePool> {
    // One database per tenant root; the root is created on first use.
    std::fs::create_dir_all(root)?;
    let db_path = db_path(root);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
