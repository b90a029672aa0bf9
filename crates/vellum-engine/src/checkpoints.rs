//! Checkpoint manager: append-only, capacity-bounded version history.
//!
//! Every edit either appends a new checkpoint (explicit save point, or the
//! first edit ever) or amends the most recent one in place (continuous
//! autosave within one editing burst).  The caller picks which via
//! `force_new_checkpoint`; no elapsed-time heuristic is inferred here.
//!
//! All operations are serialized behind one async mutex so the
//! amend-vs-append decision always observes a consistent latest-checkpoint
//! state.  Callers must additionally serialize edits per document (the
//! UI's single-active-editor invariant).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use vellum_content::addressing::{self, ContentKind};
use vellum_content::ContentStore;
use vellum_store::{Checkpoint, Database, DocumentKind};

use crate::error::Result;

/// Maximum checkpoints kept per document.  Once an append pushes the count
/// past this, the oldest checkpoints are evicted.
pub const RETENTION_CEILING: u64 = 50;

/// Which content subdirectory a document's own bytes live in.
pub(crate) fn content_kind_for(kind: DocumentKind) -> ContentKind {
    match kind {
        DocumentKind::Standard | DocumentKind::Local => ContentKind::Document,
        DocumentKind::Collaboration => ContentKind::CollaborationDocument,
    }
}

/// Serialized unit of work owning the version-history discipline.
pub struct CheckpointManager {
    db: Arc<Mutex<Database>>,
    content: Arc<ContentStore>,
    edit_lock: Mutex<()>,
}

impl CheckpointManager {
    pub fn new(db: Arc<Mutex<Database>>, content: Arc<ContentStore>) -> Self {
        Self {
            db,
            content,
            edit_lock: Mutex::new(()),
        }
    }

    /// Persist an edit: the document's current content, plus a checkpoint
    /// (appended when forced or when no history exists, amended in place
    /// otherwise).
    ///
    /// A content-tier write failure for the checkpoint bytes falls back to
    /// storing them inline on the row rather than failing the edit; a
    /// metadata insert failure after a successful blob write removes the
    /// orphan blob.
    pub async fn record_edit(
        &self,
        document_id: Uuid,
        new_content: &[u8],
        force_new_checkpoint: bool,
    ) -> Result<()> {
        let _guard = self.edit_lock.lock().await;
        let now = Utc::now();

        let doc = self.db.lock().await.get_document(document_id)?;

        // the document's own bytes
        let doc_rel = addressing::relative_path(content_kind_for(doc.kind), document_id);
        match self.content.save(&doc_rel, new_content).await {
            Ok(()) => {
                self.db.lock().await.set_document_storage_path(
                    document_id,
                    &doc_rel.to_string_lossy(),
                    now,
                )?;
            }
            Err(e) => {
                warn!(id = %document_id, error = %e, "content tier rejected document write, keeping bytes inline");
                self.db
                    .lock()
                    .await
                    .set_document_inline_content(document_id, new_content, now)?;
            }
        }

        // the version history
        let latest = self.db.lock().await.latest_checkpoint(document_id)?;
        match latest {
            Some(cp) if !force_new_checkpoint => self.amend(cp, new_content, now).await?,
            _ => self.append(document_id, new_content, now).await?,
        }

        Ok(())
    }

    async fn append(
        &self,
        document_id: Uuid,
        content: &[u8],
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let cp_id = Uuid::new_v4();
        let cp_rel = addressing::relative_path(ContentKind::Checkpoint, cp_id);

        let (storage_path, inline_content) = match self.content.save(&cp_rel, content).await {
            Ok(()) => (Some(cp_rel.to_string_lossy().into_owned()), None),
            Err(e) => {
                warn!(checkpoint = %cp_id, error = %e, "content tier rejected checkpoint write, keeping bytes inline");
                (None, Some(content.to_vec()))
            }
        };

        let checkpoint = Checkpoint {
            id: cp_id,
            document_id,
            seq: 0, // assigned by the database
            timestamp: now,
            storage_path: storage_path.clone(),
            inline_content,
        };

        let db = self.db.lock().await;
        if let Err(e) = db.insert_checkpoint(&checkpoint) {
            drop(db);
            if storage_path.is_some() {
                // no orphan blobs without a metadata row
                if let Err(del_err) = self.content.delete(&cp_rel).await {
                    warn!(checkpoint = %cp_id, error = %del_err, "failed to remove orphan checkpoint blob");
                }
            }
            return Err(e.into());
        }
        let evicted = db.prune_checkpoints(document_id, RETENTION_CEILING)?;
        drop(db);

        debug!(document = %document_id, checkpoint = %cp_id, evicted = evicted.len(), "appended checkpoint");

        for old in evicted {
            if let Some(path) = old.storage_path {
                if let Err(e) = self.content.delete(Path::new(&path)).await {
                    warn!(checkpoint = %old.id, error = %e, "failed to delete evicted checkpoint blob");
                }
            }
        }
        Ok(())
    }

    async fn amend(
        &self,
        cp: Checkpoint,
        content: &[u8],
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        // prefer keeping the checkpoint file-backed; fall back to inline
        // only when the content tier rejects the write.  The blob write
        // happens before the db lock so unrelated metadata reads are not
        // serialized behind file I/O.
        let cp_rel = addressing::relative_path(ContentKind::Checkpoint, cp.id);
        let saved = self.content.save(&cp_rel, content).await;

        let db = self.db.lock().await;
        match saved {
            Ok(()) => {
                db.amend_checkpoint(cp.id, now, Some(&cp_rel.to_string_lossy()), None)?;
            }
            Err(e) => {
                warn!(checkpoint = %cp.id, error = %e, "content tier rejected checkpoint amend, keeping bytes inline");
                db.amend_checkpoint(cp.id, now, None, Some(content))?;
            }
        }
        drop(db);
        debug!(document = %cp.document_id, checkpoint = %cp.id, "amended checkpoint");
        Ok(())
    }

    /// The most recent checkpoint, or `None` when the document has no
    /// history yet — callers treat that as "no history", not failure.
    pub async fn latest_checkpoint(&self, document_id: Uuid) -> Result<Option<Checkpoint>> {
        Ok(self.db.lock().await.latest_checkpoint(document_id)?)
    }

    /// All checkpoints for a document, newest first.
    pub async fn list_checkpoints(&self, document_id: Uuid) -> Result<Vec<Checkpoint>> {
        Ok(self.db.lock().await.list_checkpoints(document_id)?)
    }
}
