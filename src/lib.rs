//! # Corpus Index
//!
//! Multi-tenant document indexing for retrieval-augmented generation.
//!
//! Connector output (code, documentation, chat transcripts, tickets and
//! pull requests) is scored against the rest of its batch, filtered by
//! quality, chunked by content type, embedded, and written to per-tenant
//! vector collections. The pipeline itself lives in
//! [`corpus_index_core`]; this crate adds the operable pieces around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────────┐
//! │ JSON / JSONL│──▶│ Analyze → Admit →    │──▶│ <root>/<tenant>/ │
//! │  documents  │   │ Chunk → Embed        │   │  index.sqlite    │
//! └─────────────┘   └──────────────────────┘   └────────┬─────────┘
//!                                                       │
//!                                                       ▼
//!                                              ┌──────────────────┐
//!                                              │  cix search      │
//!                                              │  (tenant-scoped) │
//!                                              └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cix index docs.jsonl --category code --user u1 --org acme
//! cix search "invoice totals" --category code --user u1 --org acme
//! cix stats --org acme
//! cix admin backup ./acme.json --org acme
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Per-tenant SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector store backend |
//! | [`embedding`] | OpenAI / Ollama embedders and provider selection |
//! | [`backend`] | Backend selection and manager construction |
//! | [`ingest`] | Document loading, `index` and `analyze` commands |
//! | [`search`] | `search` command |
//! | [`stats`] | `stats` and `health` commands |
//! | [`admin`] | Reset, delete, backup and restore |

pub mod admin;
pub mod backend;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
