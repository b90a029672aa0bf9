//! Migration coordinator: lazily upgrades legacy inline-blob rows into the
//! file-backed layout.
//!
//! A row is pending while its inline content is set and its storage path
//! is not; flipping the path is the single durable transition, so an
//! interrupted run resumes by simply re-querying — no migration ledger
//! exists.  The inline copy is deliberately left in place as a rollback
//! fallback; only the explicit [`MigrationCoordinator::cleanup`] pass
//! reclaims it.
//!
//! All operations are serialized behind one async mutex.  A failure on one
//! row is logged and skipped; a failure fetching a batch aborts the run.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use vellum_content::addressing::{self, ContentKind};
use vellum_content::ContentStore;
use vellum_store::Database;

use crate::checkpoints::content_kind_for;
use crate::data_url;
use crate::error::Result;

/// Rows fetched per batch, bounding memory on large libraries.
pub const MIGRATION_BATCH: u32 = 50;

/// Serialized background process that migrates inline rows to file-backed
/// storage.
pub struct MigrationCoordinator {
    db: Arc<Mutex<Database>>,
    content: Arc<ContentStore>,
    run_lock: Mutex<()>,
}

impl MigrationCoordinator {
    pub fn new(db: Arc<Mutex<Database>>, content: Arc<ContentStore>) -> Self {
        Self {
            db,
            content,
            run_lock: Mutex::new(()),
        }
    }

    /// Whether any document, media asset or checkpoint row still holds
    /// inline content with no storage path.
    pub async fn needs_migration(&self) -> Result<bool> {
        Ok(self.pending_total().await? > 0)
    }

    async fn pending_total(&self) -> Result<u64> {
        let db = self.db.lock().await;
        Ok(db.count_pending_migration_documents()?
            + db.count_pending_migration_media()?
            + db.count_pending_migration_checkpoints()?)
    }

    /// Migrate every pending row, reporting one monotone progress fraction
    /// over the combined pending count of all three kinds.
    ///
    /// Row-level failures are logged and left pending for the next pass;
    /// they do not abort the run.  Batch fetch failures do.
    pub async fn migrate_all(&self, mut progress: impl FnMut(f64) + Send) -> Result<()> {
        let _guard = self.run_lock.lock().await;

        let total = self.pending_total().await?;
        if total == 0 {
            progress(1.0);
            return Ok(());
        }

        info!(pending = total, "starting inline-content migration");

        let mut attempted = 0u64;
        // total is a snapshot; rows inserted mid-run must not push the
        // fraction past 1.0
        let mut report =
            |attempted: u64| progress((attempted as f64 / total as f64).min(1.0));

        // fixed order: documents, media assets, checkpoints
        self.migrate_documents(&mut attempted, &mut report).await?;
        self.migrate_media(&mut attempted, &mut report).await?;
        self.migrate_checkpoints(&mut attempted, &mut report).await?;

        info!(migrated = attempted, "inline-content migration pass complete");
        Ok(())
    }

    async fn migrate_documents(
        &self,
        attempted: &mut u64,
        report: &mut impl FnMut(u64),
    ) -> Result<()> {
        let mut failed: HashSet<Uuid> = HashSet::new();
        loop {
            let fetch_limit = MIGRATION_BATCH + failed.len() as u32;
            let batch = self
                .db
                .lock()
                .await
                .pending_migration_documents(fetch_limit)?;
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|d| !failed.contains(&d.id))
                .take(MIGRATION_BATCH as usize)
                .collect();
            if fresh.is_empty() {
                return Ok(());
            }

            for doc in fresh {
                // predicate guarantees the inline copy is present
                let Some(bytes) = doc.inline_content.as_deref() else {
                    continue;
                };
                let rel = addressing::relative_path(content_kind_for(doc.kind), doc.id);
                let outcome = async {
                    self.content.save(&rel, bytes).await?;
                    self.db.lock().await.set_document_storage_path(
                        doc.id,
                        &rel.to_string_lossy(),
                        doc.updated_at,
                    )?;
                    Ok::<_, crate::StorageError>(())
                }
                .await;

                if let Err(e) = outcome {
                    warn!(document = %doc.id, error = %e, "migration row failed, leaving pending");
                    failed.insert(doc.id);
                }
                *attempted += 1;
                report(*attempted);
            }
        }
    }

    async fn migrate_media(
        &self,
        attempted: &mut u64,
        report: &mut impl FnMut(u64),
    ) -> Result<()> {
        let mut failed: HashSet<Uuid> = HashSet::new();
        loop {
            let fetch_limit = MIGRATION_BATCH + failed.len() as u32;
            let batch = self.db.lock().await.pending_migration_media(fetch_limit)?;
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|a| !failed.contains(&a.id))
                .take(MIGRATION_BATCH as usize)
                .collect();
            if fresh.is_empty() {
                return Ok(());
            }

            for asset in fresh {
                let Some(url) = asset.inline_data_url.as_deref() else {
                    continue;
                };
                let outcome = async {
                    let (mime, bytes) = data_url::decode(url)?;
                    let rel = addressing::media_relative_path(asset.id, &mime);
                    self.content.save(&rel, &bytes).await?;
                    self.db
                        .lock()
                        .await
                        .set_media_storage_path(asset.id, &rel.to_string_lossy())?;
                    Ok::<_, crate::StorageError>(())
                }
                .await;

                if let Err(e) = outcome {
                    warn!(asset = %asset.id, error = %e, "migration row failed, leaving pending");
                    failed.insert(asset.id);
                }
                *attempted += 1;
                report(*attempted);
            }
        }
    }

    async fn migrate_checkpoints(
        &self,
        attempted: &mut u64,
        report: &mut impl FnMut(u64),
    ) -> Result<()> {
        let mut failed: HashSet<Uuid> = HashSet::new();
        loop {
            let fetch_limit = MIGRATION_BATCH + failed.len() as u32;
            let batch = self
                .db
                .lock()
                .await
                .pending_migration_checkpoints(fetch_limit)?;
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|c| !failed.contains(&c.id))
                .take(MIGRATION_BATCH as usize)
                .collect();
            if fresh.is_empty() {
                return Ok(());
            }

            for cp in fresh {
                let Some(bytes) = cp.inline_content.as_deref() else {
                    continue;
                };
                let rel = addressing::relative_path(ContentKind::Checkpoint, cp.id);
                let outcome = async {
                    self.content.save(&rel, bytes).await?;
                    self.db
                        .lock()
                        .await
                        .set_checkpoint_storage_path(cp.id, &rel.to_string_lossy())?;
                    Ok::<_, crate::StorageError>(())
                }
                .await;

                if let Err(e) = outcome {
                    warn!(checkpoint = %cp.id, error = %e, "migration row failed, leaving pending");
                    failed.insert(cp.id);
                }
                *attempted += 1;
                report(*attempted);
            }
        }
    }

    /// Explicit, opt-in space reclamation: null the inline copy of every
    /// row that already has file-backed content.  Never invoked
    /// automatically — the inline copies are the rollback path while the
    /// storage tier proves itself.
    pub async fn cleanup(&self) -> Result<usize> {
        let _guard = self.run_lock.lock().await;
        let db = self.db.lock().await;
        let cleared = db.clear_migrated_document_inline()?
            + db.clear_migrated_media_inline()?
            + db.clear_migrated_checkpoint_inline()?;
        info!(cleared, "inline fallback copies reclaimed");
        Ok(cleared)
    }
}
