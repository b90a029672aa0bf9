//! Per-document sync phase, observable by the UI.
//!
//! One tracker instance exists per process; it is constructed at startup
//! and injected into every component that reads or writes it (no hidden
//! global).  The sync coordinator and the content store's upload/download
//! paths drive transitions; the UI only reads.  Nothing here affects
//! storage correctness — it exists to decouple slow I/O from presentation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Where a document currently sits in the sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum SyncPhase {
    /// Waiting for a transfer slot.
    Queued,
    /// Local bytes are being pushed to the cloud root.
    Uploading,
    /// Cloud bytes are being materialized locally.
    Downloading {
        /// Fraction complete, 0..1.
        progress: f64,
    },
    /// Local copy is newer than the cloud copy.
    NeedsUpload,
    /// Cloud copy is newer than the local copy.
    NeedsDownload,
    /// Both sides changed; waiting on the host sync daemon to resolve.
    Conflict,
    /// Content is not reachable on either tier right now.
    NotAvailable,
    /// The last transfer attempt failed.
    Error,
    /// Both tiers agree.
    Synced,
}

impl SyncPhase {
    /// Whether this phase counts as completed for aggregate progress.
    fn is_settled(&self) -> bool {
        matches!(self, SyncPhase::Synced)
    }
}

/// Aggregate pipeline progress: how many tracked documents have settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
}

/// Process-wide observable sync state, one entry per in-flight document.
pub struct SyncStatusTracker {
    entries: Mutex<HashMap<Uuid, SyncPhase>>,
    progress_tx: watch::Sender<SyncProgress>,
}

impl SyncStatusTracker {
    pub fn new() -> Self {
        let (progress_tx, _rx) = watch::channel(SyncProgress::default());
        Self {
            entries: Mutex::new(HashMap::new()),
            progress_tx,
        }
    }

    /// Record a phase transition for one document.
    pub fn set_phase(&self, id: Uuid, phase: SyncPhase) {
        let mut entries = self.entries.lock().unwrap();
        tracing::debug!(id = %id, phase = ?phase, "sync phase");
        entries.insert(id, phase);
        self.publish(&entries);
    }

    /// Current phase for a document, if it is being tracked.
    pub fn phase(&self, id: Uuid) -> Option<SyncPhase> {
        self.entries.lock().unwrap().get(&id).cloned()
    }

    /// Stop tracking a document (e.g. after deletion).
    pub fn remove(&self, id: Uuid) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&id);
        self.publish(&entries);
    }

    /// Current aggregate progress.
    pub fn progress(&self) -> SyncProgress {
        *self.progress_tx.borrow()
    }

    /// Observe aggregate progress changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// All tracked entries, for list UIs.
    pub fn snapshot(&self) -> Vec<(Uuid, SyncPhase)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(id, phase)| (*id, phase.clone()))
            .collect()
    }

    fn publish(&self, entries: &HashMap<Uuid, SyncPhase>) {
        let progress = SyncProgress {
            current: entries.values().filter(|p| p.is_settled()).count(),
            total: entries.len(),
        };
        self.progress_tx.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }
}

impl Default for SyncStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_counts_settled_entries() {
        let tracker = SyncStatusTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        tracker.set_phase(a, SyncPhase::Uploading);
        tracker.set_phase(b, SyncPhase::Queued);
        assert_eq!(tracker.progress(), SyncProgress { current: 0, total: 2 });

        tracker.set_phase(a, SyncPhase::Synced);
        assert_eq!(tracker.progress(), SyncProgress { current: 1, total: 2 });

        tracker.remove(b);
        assert_eq!(tracker.progress(), SyncProgress { current: 1, total: 1 });
    }

    #[test]
    fn progress_published_only_on_change() {
        let tracker = SyncStatusTracker::new();
        let id = Uuid::new_v4();
        let mut rx = tracker.subscribe();

        tracker.set_phase(id, SyncPhase::Queued);
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        // phase change that leaves the aggregate untouched
        tracker.set_phase(id, SyncPhase::Uploading);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn phase_round_trip() {
        let tracker = SyncStatusTracker::new();
        let id = Uuid::new_v4();
        assert_eq!(tracker.phase(id), None);

        tracker.set_phase(id, SyncPhase::Downloading { progress: 0.5 });
        assert_eq!(
            tracker.phase(id),
            Some(SyncPhase::Downloading { progress: 0.5 })
        );
    }

    #[test]
    fn ui_payload_shape() {
        let json = serde_json::to_value(SyncPhase::Downloading { progress: 0.25 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "phase": "downloading", "progress": 0.25 })
        );
        assert_eq!(
            serde_json::to_value(SyncPhase::Synced).unwrap(),
            serde_json::json!({ "phase": "synced" })
        );
    }
}
