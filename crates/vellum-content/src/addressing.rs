//! Blob addressing: the pure mapping from `(content kind, id)` to a
//! relative path under a storage root.
//!
//! Both the content store and the migration coordinator recompute this
//! mapping independently, so it must stay deterministic and stateless.
//! The four subdirectory names are part of the durable on-disk contract
//! and must not change without a migration step.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Extension used for document and checkpoint payloads.
const SKETCH_EXT: &str = "sketch";

/// Extension used for media whose MIME type has no table entry.
const GENERIC_EXT: &str = "bin";

/// What kind of content a blob holds.  Selects the subdirectory and, for
/// non-media kinds, the file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A regular drawing's current content.
    Document,
    /// A collaboration room's current content.
    CollaborationDocument,
    /// A retained historical version.
    Checkpoint,
    /// An embedded image or attachment.
    MediaAsset,
}

impl ContentKind {
    /// Fixed subdirectory under the storage root.
    pub fn subdirectory(&self) -> &'static str {
        match self {
            ContentKind::Document => "Files",
            ContentKind::CollaborationDocument => "CollaborationFiles",
            ContentKind::Checkpoint => "Checkpoints",
            ContentKind::MediaAsset => "MediaItems",
        }
    }
}

/// Relative path for a non-media blob: `<subdir>/<id>.sketch`.
///
/// Media assets carry a MIME type; use [`media_relative_path`] for those.
pub fn relative_path(kind: ContentKind, id: Uuid) -> PathBuf {
    PathBuf::from(kind.subdirectory()).join(format!("{id}.{SKETCH_EXT}"))
}

/// Relative path for a media blob: `MediaItems/<id>.<ext>` with the
/// extension derived from the MIME type.
pub fn media_relative_path(id: Uuid, mime_type: &str) -> PathBuf {
    PathBuf::from(ContentKind::MediaAsset.subdirectory())
        .join(format!("{id}.{}", extension_for_mime(mime_type)))
}

/// File extension for a media MIME type.  Unknown types fall back to a
/// generic binary extension.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "image/webp" => "webp",
        _ => GENERIC_EXT,
    }
}

/// MIME type for a media file extension.  Exact right-inverse of
/// [`extension_for_mime`] for the supported types; `None` for anything
/// else (including the generic binary extension, which is lossy).
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "pdf" => Some("application/pdf"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_fixed_subdirectories() {
        assert_eq!(ContentKind::Document.subdirectory(), "Files");
        assert_eq!(
            ContentKind::CollaborationDocument.subdirectory(),
            "CollaborationFiles"
        );
        assert_eq!(ContentKind::Checkpoint.subdirectory(), "Checkpoints");
        assert_eq!(ContentKind::MediaAsset.subdirectory(), "MediaItems");
    }

    #[test]
    fn document_path_shape() {
        let id = Uuid::new_v4();
        let path = relative_path(ContentKind::Document, id);
        assert_eq!(path, PathBuf::from(format!("Files/{id}.sketch")));
    }

    #[test]
    fn media_path_uses_mime_extension() {
        let id = Uuid::new_v4();
        let path = media_relative_path(id, "image/webp");
        assert_eq!(path, PathBuf::from(format!("MediaItems/{id}.webp")));
    }

    #[test]
    fn unknown_mime_falls_back_to_bin() {
        assert_eq!(extension_for_mime("application/x-whatever"), "bin");
    }

    #[test]
    fn mime_table_is_right_inverse() {
        for mime in [
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/svg+xml",
            "application/pdf",
            "image/webp",
        ] {
            let ext = extension_for_mime(mime);
            assert_eq!(mime_for_extension(ext), Some(mime));
        }
        assert_eq!(mime_for_extension("bin"), None);
    }

    #[test]
    fn mapping_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(
            relative_path(ContentKind::Checkpoint, id),
            relative_path(ContentKind::Checkpoint, id)
        );
    }
}
