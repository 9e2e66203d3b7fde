//! # Corpus Index Core
//!
//! Multi-tenant document indexing for retrieval: documents from code,
//! documentation, chat, and ticket connectors are scored against the rest
//! of their batch, filtered by quality, chunked by content type, embedded,
//! and written to per-tenant vector collections.
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Document, annotation, and chunk types |
//! | [`tenant`] | Tenant resolution, collection naming, quotas |
//! | [`classify`] | Heuristic enrichment (purpose, category, frameworks) |
//! | [`analysis`] | Two-phase cross-document quality analysis |
//! | [`chunk`] | Content-aware chunking and chunk ids |
//! | [`record`] | Storage records and metadata flattening |
//! | [`embedding`] | Embedder seam and vector helpers |
//! | [`store`] | Vector store trait, scoped filters, in-memory backend |
//! | [`manager`] | Per-tenant store access, stats, backup and restore |
//! | [`indexer`] | The indexing pipeline |
//! | [`search`] | Tenant-scoped retrieval with aggregate analysis |
//!
//! This crate does no filesystem I/O apart from backup files and has no
//! database driver; the SQLite backend and HTTP embedders live in the
//! `corpus-index` app crate.

pub mod analysis;
pub mod chunk;
pub mod classify;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod manager;
pub mod models;
mod patterns;
pub mod record;
pub mod search;
pub mod store;
pub mod tenant;

pub use error::{IndexError, Result};
