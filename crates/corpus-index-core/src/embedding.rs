//! Embedding seam and vector utilities.
//!
//! [`Embedder`] is the single async interface the indexer and retrieval
//! paths use to turn text into vectors. The core ships one implementation,
//! [`HashingEmbedder`], which needs no model or network and is fully
//! deterministic. HTTP-backed providers live in the `corpus-index` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{IndexError, Result};

/// Text-to-vector function shared by every collection of a deployment.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in collection metadata.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Embed a batch; the output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Signed feature-hashing embedder.
///
/// Lowercased alphanumeric tokens (and the parts of `snake_case` tokens, at
/// half weight) are hashed with SHA-256 into `dims` buckets with a sign bit,
/// then L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    model: String,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMS: usize = 512;

    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(IndexError::Config("embedding dims must be > 0".into()));
        }
        Ok(Self {
            dims,
            model: format!("hashing-{dims}"),
        })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| t.chars().count() >= 2)
        {
            self.add_feature(&mut v, token, 1.0);
            if token.contains('_') {
                for part in token.split('_').filter(|p| p.chars().count() >= 2) {
                    self.add_feature(&mut v, part, 0.5);
                }
            }
        }
        normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], token: &str, weight: f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(bytes);
        let bucket = (h % self.dims as u64) as usize;
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dims: Self::DEFAULT_DIMS,
            model: format!("hashing-{}", Self::DEFAULT_DIMS),
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scale `v` to unit length in place; zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Distance reported by stores: `1 - cosine`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn test_cosine_edges() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed_one("reconcile_ledger_entries nightly");
        assert_eq!(a, e.embed_one("reconcile_ledger_entries nightly"));
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_similarity_tracks_overlap() {
        let e = HashingEmbedder::default();
        let q = e.embed_one("reconcile_ledger_entries");
        let hit = e.embed_one("fn reconcile_ledger_entries() walks the ledger");
        let miss = e.embed_one("alice: the deploy failed again");
        assert!(cosine_similarity(&q, &hit) > cosine_similarity(&q, &miss));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16).unwrap();
        assert!(e.embed_one("").iter().all(|x| *x == 0.0));
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_embed_preserves_order() {
        let e = HashingEmbedder::default();
        let texts = vec!["alpha_beta".to_string(), "gamma".to_string()];
        let out = e.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], e.embed_one("gamma"));
    }
}
