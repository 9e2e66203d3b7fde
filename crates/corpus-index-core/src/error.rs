//! Error types for the indexing pipeline.
//!
//! Only failures that stop an operation outright are represented here.
//! Per-document problems and admission rejections are not errors; they are
//! collected into the [`IndexReport`](crate::indexer::IndexReport) of a run.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Top-level error for store, embedding, and configuration failures.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding store could not be opened or reached.
    #[error("embedding store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reachable but rejected the operation.
    #[error("store operation failed: {0}")]
    Store(String),

    /// A store operation or batch write exceeded its time bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The embedding function failed or returned malformed output.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Unknown collection category.
    #[error("invalid collection category: '{0}'")]
    InvalidCategory(String),

    /// A document violates the ingress contract.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Data belonging to one tenant was presented for another.
    #[error("tenant mismatch: expected '{expected}', found '{found}'")]
    TenantMismatch { expected: String, found: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl IndexError {
    /// True for failures that abort a single batch rather than the run.
    pub fn is_batch_scoped(&self) -> bool {
        matches!(
            self,
            IndexError::Store(_) | IndexError::Timeout(_) | IndexError::Embedding(_)
        )
    }
}

/// Run `fut` with an upper time bound, mapping expiry to [`IndexError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(IndexError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let v = with_timeout(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let res: Result<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(IndexError::Timeout(_))));
    }

    #[test]
    fn test_batch_scoped_classification() {
        assert!(IndexError::Store("x".into()).is_batch_scoped());
        assert!(IndexError::Timeout(Duration::from_secs(1)).is_batch_scoped());
        assert!(!IndexError::StoreUnavailable("x".into()).is_batch_scoped());
        assert!(!IndexError::Config("x".into()).is_batch_scoped());
    }
}
