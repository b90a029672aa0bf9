//! # vellum-engine
//!
//! The storage engine facade: ties the metadata tier (`vellum-store`) and
//! the content tier (`vellum-content`) together behind the contract the
//! editing surface consumes.
//!
//! Three serialized units of work live here: the checkpoint manager
//! (amend-vs-append version history with a bounded retention ceiling), the
//! migration coordinator (lazily upgrades legacy inline-blob rows to
//! file-backed storage), and the engine facade itself (three-tier read
//! fallback, soft/hard delete).  Operations within one unit are strictly
//! ordered; operations across units interleave freely.

pub mod checkpoints;
pub mod data_url;
pub mod engine;
pub mod migration;

mod error;

pub use checkpoints::{CheckpointManager, RETENTION_CEILING};
pub use engine::StorageEngine;
pub use error::{Result, StorageError};
pub use migration::{MigrationCoordinator, MIGRATION_BATCH};
