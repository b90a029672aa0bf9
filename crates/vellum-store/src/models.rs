//! Domain model structs persisted in the metadata database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer over IPC.
//!
//! Documents, checkpoints and media assets all follow the same storage
//! duality: bytes live either in the content tier (referenced by a relative
//! `storage_path`) or inline on the row.  When both fields are set the
//! file-backed copy is authoritative — migration deliberately leaves the
//! inline copy in place as a rollback fallback until an explicit cleanup
//! pass removes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// How a document is hosted.  Resolved once at construction; determines
/// which content subdirectory its bytes land in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A regular single-user drawing.
    Standard,
    /// A shared collaboration room.
    Collaboration,
    /// A drawing backed by a user-chosen local folder.
    Local,
}

impl DocumentKind {
    /// Stable TEXT encoding used in the `documents.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Standard => "standard",
            DocumentKind::Collaboration => "collaboration",
            DocumentKind::Local => "local",
        }
    }

    /// Inverse of [`DocumentKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(DocumentKind::Standard),
            "collaboration" => Some(DocumentKind::Collaboration),
            "local" => Some(DocumentKind::Local),
            _ => None,
        }
    }
}

/// A logical document: a drawing or collaboration room's persistent
/// identity, independent of where its bytes currently live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Stable unique identifier.
    pub id: Uuid,
    /// Human-readable display name.
    pub name: String,
    /// Hosting kind, fixed at creation.
    pub kind: DocumentKind,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every content edit and on migration.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag.  Trashed documents keep their checkpoints.
    pub in_trash: bool,
    /// Relative path into the content tier, `None` while content is inline.
    pub storage_path: Option<String>,
    /// Raw content bytes retained until (and after) migration.
    pub inline_content: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// A retained historical version of a document's content.
///
/// Checkpoints for one document are totally ordered by `(timestamp, seq)`;
/// `seq` is the SQLite AUTOINCREMENT rowid and breaks timestamp ties by
/// insertion order so retention pruning is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    /// Stable unique identifier.
    pub id: Uuid,
    /// The document this version belongs to.
    pub document_id: Uuid,
    /// Insertion counter, assigned by the database.
    pub seq: i64,
    /// When this version was captured (refreshed when amended in place).
    pub timestamp: DateTime<Utc>,
    /// Relative path into the content tier, `None` while content is inline.
    pub storage_path: Option<String>,
    /// Raw content bytes retained until migrated.
    pub inline_content: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// MediaAsset
// ---------------------------------------------------------------------------

/// An embedded image or attachment referenced by a document's content
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaAsset {
    /// Stable unique identifier.
    pub id: Uuid,
    /// MIME type, e.g. `image/png`.  Determines the file extension.
    pub mime_type: String,
    /// Relative path into the content tier, `None` while content is inline.
    pub storage_path: Option<String>,
    /// Base64 data URL (`data:<mime>;base64,<payload>`) retained until
    /// migrated.
    pub inline_data_url: Option<String>,
    /// Last time the asset bytes were served to the editing surface.
    pub last_retrieved_at: DateTime<Utc>,
}
