//! # vellum-store
//!
//! Structured metadata tier of the hybrid storage engine, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers for the three persisted
//! entity kinds: documents, checkpoints and media assets.  Bulk content
//! lives in `vellum-content`; rows here carry either a relative
//! `storage_path` into that tier or a temporary inline copy of the bytes
//! awaiting migration.

pub mod checkpoints;
pub mod database;
pub mod documents;
pub mod media;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
