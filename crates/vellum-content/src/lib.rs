//! # vellum-content
//!
//! Bulk-content tier of the hybrid storage engine.
//!
//! Document, checkpoint and media bytes live as `<uuid>.<ext>` files under
//! four fixed subdirectories of either a cloud-synced container root or a
//! local cache root.  This crate owns that layout ([`addressing`]), the
//! two-root store with atomic writes and on-demand cloud materialization
//! ([`store`]), the reachability probe gating cloud operations
//! ([`availability`]), and the per-document sync phase surface consumed by
//! the UI ([`sync_status`]).
//!
//! The content tier knows nothing about the metadata relationship graph;
//! it is addressed purely by `(content kind, id)`.

pub mod addressing;
pub mod availability;
pub mod store;
pub mod sync_status;

mod error;

pub use addressing::ContentKind;
pub use availability::{AvailabilityMonitor, CloudStatus};
pub use error::{ContentError, Result};
pub use store::ContentStore;
pub use sync_status::{SyncPhase, SyncProgress, SyncStatusTracker};
