//! Cloud container reachability monitor.
//!
//! A synchronous probe at construction decides the initial state, then a
//! background task re-probes every 30 seconds and publishes on a `watch`
//! channel only when the status actually changes.  Every content-store
//! cloud operation consults [`AvailabilityMonitor::current`] first; when
//! the container is unavailable the local cache root becomes authoritative
//! and cloud operations are skipped rather than failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the background task re-probes the container.
pub const REPROBE_PERIOD: Duration = Duration::from_secs(30);

/// Reachability of the cloud container root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum CloudStatus {
    /// Container reachable and writable.
    Available,
    /// No container configured or not reachable at all.
    Unavailable,
    /// Container present but misbehaving (e.g. read-only).
    Degraded(String),
}

/// A reachability check.  Injected so tests can script transitions.
pub trait AvailabilityProbe: Send + Sync + 'static {
    fn probe(&self) -> CloudStatus;
}

/// Default probe: the container root must exist and accept a small probe
/// file write.
pub struct ContainerProbe {
    root: Option<PathBuf>,
}

impl ContainerProbe {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl AvailabilityProbe for ContainerProbe {
    fn probe(&self) -> CloudStatus {
        let Some(root) = &self.root else {
            return CloudStatus::Unavailable;
        };
        if !root.is_dir() {
            return CloudStatus::Unavailable;
        }
        match check_writable(root) {
            Ok(()) => CloudStatus::Available,
            Err(e) => CloudStatus::Degraded(format!("container not writable: {e}")),
        }
    }
}

fn check_writable(root: &Path) -> std::io::Result<()> {
    let probe_path = root.join(".vellum-probe");
    std::fs::write(&probe_path, b"")?;
    std::fs::remove_file(&probe_path)?;
    Ok(())
}

/// Process-wide cloud availability state.
///
/// Constructed once and shared via `Arc`; [`spawn`](Self::spawn) starts the
/// periodic re-probe loop.
pub struct AvailabilityMonitor {
    probe: Arc<dyn AvailabilityProbe>,
    tx: watch::Sender<CloudStatus>,
}

impl AvailabilityMonitor {
    /// Probe synchronously and publish the initial state.
    pub fn new(probe: impl AvailabilityProbe) -> Self {
        let probe: Arc<dyn AvailabilityProbe> = Arc::new(probe);
        let initial = probe.probe();
        info!(status = ?initial, "cloud availability at startup");
        let (tx, _rx) = watch::channel(initial);
        Self { probe, tx }
    }

    /// Monitor for a container rooted at `root` (or no container at all).
    pub fn for_container(root: Option<PathBuf>) -> Self {
        Self::new(ContainerProbe::new(root))
    }

    /// The last observed status.  Cheap; never probes.
    pub fn current(&self) -> CloudStatus {
        self.tx.borrow().clone()
    }

    /// True when cloud operations should be attempted at all.
    pub fn is_available(&self) -> bool {
        matches!(self.current(), CloudStatus::Available)
    }

    /// Receive status-change events.  Only transitions are published.
    pub fn subscribe(&self) -> watch::Receiver<CloudStatus> {
        self.tx.subscribe()
    }

    /// Probe once now; publish only if the status changed.
    pub fn refresh(&self) -> CloudStatus {
        let status = self.probe.probe();
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        if changed {
            warn!(status = ?status, "cloud availability changed");
        } else {
            debug!(status = ?status, "cloud availability unchanged");
        }
        status
    }

    /// Start the periodic re-probe loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPROBE_PERIOD);
            // the first tick fires immediately and would duplicate the
            // constructor's probe
            interval.tick().await;
            loop {
                interval.tick().await;
                monitor.refresh();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Probe returning a scripted sequence of statuses (last one repeats).
    struct ScriptedProbe {
        script: Mutex<Vec<CloudStatus>>,
    }

    impl ScriptedProbe {
        fn new(mut statuses: Vec<CloudStatus>) -> Self {
            statuses.reverse();
            Self {
                script: Mutex::new(statuses),
            }
        }
    }

    impl AvailabilityProbe for ScriptedProbe {
        fn probe(&self) -> CloudStatus {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script[0].clone()
            }
        }
    }

    #[test]
    fn initial_state_from_synchronous_probe() {
        let monitor = AvailabilityMonitor::new(ScriptedProbe::new(vec![CloudStatus::Unavailable]));
        assert_eq!(monitor.current(), CloudStatus::Unavailable);
        assert!(!monitor.is_available());
    }

    #[test]
    fn refresh_publishes_only_on_transition() {
        let monitor = AvailabilityMonitor::new(ScriptedProbe::new(vec![
            CloudStatus::Available,
            CloudStatus::Available,
            CloudStatus::Unavailable,
        ]));
        let mut rx = monitor.subscribe();
        rx.mark_unchanged();

        // same status: no event
        monitor.refresh();
        assert!(!rx.has_changed().unwrap());

        // transition: event
        monitor.refresh();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CloudStatus::Unavailable);
    }

    #[test]
    fn missing_container_is_unavailable() {
        let monitor = AvailabilityMonitor::for_container(None);
        assert_eq!(monitor.current(), CloudStatus::Unavailable);

        let monitor =
            AvailabilityMonitor::for_container(Some(PathBuf::from("/nonexistent/container")));
        assert_eq!(monitor.current(), CloudStatus::Unavailable);
    }

    #[test]
    fn writable_container_is_available() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = AvailabilityMonitor::for_container(Some(dir.path().to_path_buf()));
        assert_eq!(monitor.current(), CloudStatus::Available);
    }
}
