//! Two-root content store.
//!
//! Bytes live under the cloud container root when it is reachable, else
//! under the local cache root.  Writes are atomic (temp file + rename in
//! the destination directory) so a path is never partially overwritten.
//! Reads under the cloud root materialize not-yet-downloaded placeholders
//! first, bounded by a 30 second timeout.
//!
//! Writes within this store are serialized behind one async mutex; reads
//! and operations of other subsystems interleave freely.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::addressing::{self, ContentKind};
use crate::availability::AvailabilityMonitor;
use crate::error::{ContentError, Result};
use crate::sync_status::{SyncPhase, SyncStatusTracker};

/// Ceiling on how long [`ContentStore::materialize`] waits for the host
/// sync daemon to produce the real file.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll period while waiting for a placeholder to resolve.
const DOWNLOAD_POLL: Duration = Duration::from_millis(250);

/// Raw byte storage addressed by relative path, spanning an optional
/// cloud-synced container root and a mandatory local cache root.
pub struct ContentStore {
    cloud_root: Option<PathBuf>,
    local_root: PathBuf,
    availability: Arc<AvailabilityMonitor>,
    tracker: Arc<SyncStatusTracker>,
    download_timeout: Duration,
    write_lock: Mutex<()>,
}

impl ContentStore {
    pub fn new(
        cloud_root: Option<PathBuf>,
        local_root: PathBuf,
        availability: Arc<AvailabilityMonitor>,
        tracker: Arc<SyncStatusTracker>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&local_root)?;

        info!(
            cloud = ?cloud_root,
            local = %local_root.display(),
            "content store initialized"
        );

        Ok(Self {
            cloud_root,
            local_root,
            availability,
            tracker,
            download_timeout: DOWNLOAD_TIMEOUT,
            write_lock: Mutex::new(()),
        })
    }

    /// Shrink the materialize timeout.  Test-only knob.
    #[doc(hidden)]
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// The root new writes go to right now: the cloud container when it is
    /// reachable, else the local cache.
    fn authoritative_root(&self) -> &Path {
        match &self.cloud_root {
            Some(cloud) if self.availability.is_available() => cloud,
            _ => &self.local_root,
        }
    }

    /// Whether cloud reads/writes should be attempted at all.
    fn cloud_active(&self) -> Option<&Path> {
        self.cloud_root
            .as_deref()
            .filter(|_| self.availability.is_available())
    }

    /// Read the bytes for a relative path.
    ///
    /// Resolution order: cloud root (materializing a placeholder first),
    /// then local cache root, then [`ContentError::NotFound`].
    pub async fn load(&self, rel: &Path) -> Result<Vec<u8>> {
        if let Some(cloud) = self.cloud_active() {
            let full = cloud.join(rel);
            if full.is_file() {
                let bytes = fs::read(&full).await?;
                debug!(path = %rel.display(), size = bytes.len(), "loaded from cloud root");
                return Ok(bytes);
            }
            if placeholder_path(&full).is_file() {
                self.materialize(rel).await?;
                let bytes = fs::read(&full).await?;
                debug!(path = %rel.display(), size = bytes.len(), "loaded after materialize");
                return Ok(bytes);
            }
        }

        let local = self.local_root.join(rel);
        if local.is_file() {
            let bytes = fs::read(&local).await?;
            debug!(path = %rel.display(), size = bytes.len(), "loaded from local root");
            return Ok(bytes);
        }

        Err(ContentError::NotFound(rel.to_path_buf()))
    }

    /// Atomically write bytes under the authoritative root.
    pub async fn save(&self, rel: &Path, bytes: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let full = self.authoritative_root().join(rel);
        write_atomic(&full, bytes).await?;
        debug!(path = %rel.display(), size = bytes.len(), "saved");
        Ok(())
    }

    /// Force a cloud-resident file to become locally readable.
    ///
    /// A placeholder (a `.<name>.icloud` sibling left by the host sync
    /// daemon) means the download has not happened yet; the daemon is
    /// polled until the real file appears or the timeout expires.
    /// [`ContentError::DownloadTimeout`] is retryable, not fatal.
    pub async fn materialize(&self, rel: &Path) -> Result<()> {
        let Some(cloud) = self.cloud_active() else {
            return Err(ContentError::ContainerUnavailable);
        };
        let full = cloud.join(rel);
        if full.is_file() {
            return Ok(());
        }
        if !placeholder_path(&full).is_file() {
            return Err(ContentError::NotFound(rel.to_path_buf()));
        }

        let id = id_from_relative(rel);
        if let Some(id) = id {
            self.tracker
                .set_phase(id, SyncPhase::Downloading { progress: 0.0 });
        }

        let started = tokio::time::Instant::now();
        loop {
            if full.is_file() {
                if let Some(id) = id {
                    self.tracker.set_phase(id, SyncPhase::Synced);
                }
                debug!(path = %rel.display(), "materialized");
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.download_timeout {
                warn!(path = %rel.display(), "download did not complete in time");
                if let Some(id) = id {
                    self.tracker.set_phase(id, SyncPhase::Error);
                }
                return Err(ContentError::DownloadTimeout(rel.to_path_buf()));
            }
            if let Some(id) = id {
                let progress =
                    (elapsed.as_secs_f64() / self.download_timeout.as_secs_f64()).min(0.99);
                self.tracker
                    .set_phase(id, SyncPhase::Downloading { progress });
            }
            tokio::time::sleep(DOWNLOAD_POLL).await;
        }
    }

    /// Push a known-newer local version to the cloud root unconditionally
    /// (last-writer-wins at the file level — no merge).
    ///
    /// The remote file's modification time is set to `updated_at` so later
    /// staleness comparisons are accurate.  `mime_type` selects the media
    /// extension; it is ignored for the non-media kinds.
    pub async fn upload(
        &self,
        id: Uuid,
        bytes: &[u8],
        updated_at: DateTime<Utc>,
        kind: ContentKind,
        mime_type: Option<&str>,
    ) -> Result<PathBuf> {
        let Some(cloud) = self.cloud_active() else {
            return Err(ContentError::ContainerUnavailable);
        };

        let rel = match kind {
            ContentKind::MediaAsset => addressing::media_relative_path(
                id,
                mime_type.unwrap_or("application/octet-stream"),
            ),
            _ => addressing::relative_path(kind, id),
        };
        let full = cloud.join(&rel);

        self.tracker.set_phase(id, SyncPhase::Uploading);

        let _guard = self.write_lock.lock().await;
        let result = async {
            write_atomic(&full, bytes).await?;
            set_modified(&full, updated_at)?;
            Ok::<_, ContentError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.tracker.set_phase(id, SyncPhase::Synced);
                debug!(id = %id, path = %rel.display(), size = bytes.len(), "uploaded");
                Ok(rel)
            }
            Err(e) => {
                self.tracker.set_phase(id, SyncPhase::Error);
                Err(e)
            }
        }
    }

    /// Remove the backing file from both roots.  A missing file is not an
    /// error.
    pub async fn delete(&self, rel: &Path) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for root in self.cloud_root.iter().chain(Some(&self.local_root)) {
            let full = root.join(rel);
            match fs::remove_file(&full).await {
                Ok(()) => debug!(path = %full.display(), "deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Write via a temp file in the destination directory, then rename.  The
/// rename is atomic on the same filesystem, so readers observe either the
/// old bytes or the new bytes, never a mix.
async fn write_atomic(full: &Path, bytes: &[u8]) -> Result<()> {
    let dir = full.parent().ok_or_else(|| {
        ContentError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    fs::create_dir_all(dir).await?;

    let file_name = full
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blob");
    let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, full).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// `.<name>.icloud` sibling the host sync daemon leaves for files it has
/// evicted or not yet downloaded.
fn placeholder_path(full: &Path) -> PathBuf {
    let name = full
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    full.with_file_name(format!(".{name}.icloud"))
}

/// Recover the document/asset id from a `<subdir>/<uuid>.<ext>` path, for
/// sync-status bookkeeping.
fn id_from_relative(rel: &Path) -> Option<Uuid> {
    rel.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn set_modified(full: &Path, updated_at: DateTime<Utc>) -> Result<()> {
    let file = std::fs::File::options().write(true).open(full)?;
    file.set_modified(SystemTime::from(updated_at))?;
    Ok(())
}
