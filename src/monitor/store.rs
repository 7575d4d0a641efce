//! Shared growth state and active-file pointer.
//!
//! [`RecordingStore`] is written by the directory monitor only and read by any
//! number of streaming sessions. Both the tracker and the active file sit
//! behind one [`RwLock`], so a reader never observes a half-applied cycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;

use super::tracker::{GrowthChange, GrowthTracker, TrackedFile};

/// The file currently being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFile {
    pub path: PathBuf,
    /// File name, also the key into the growth tracker.
    pub name: String,
    pub modified: SystemTime,
}

/// Growth queries used while following a file.
pub trait GrowthState: Send + Sync {
    /// Whether `name` changed size within the stall timeout.
    fn is_growing(&self, name: &str) -> bool;

    /// Whether `name` stopped growing at least a stall timeout ago.
    fn is_stalled(&self, name: &str) -> bool;

    /// How long a file must be unchanged before it counts as finished.
    fn stall_timeout(&self) -> Duration;
}

#[derive(Debug)]
struct StoreInner {
    tracker: GrowthTracker,
    active: Option<Arc<ActiveFile>>,
}

/// Owned replacement for process-wide file state.
#[derive(Debug)]
pub struct RecordingStore {
    inner: RwLock<StoreInner>,
    reset: AtomicBool,
}

impl RecordingStore {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                tracker: GrowthTracker::new(stall_timeout),
                active: None,
            }),
            reset: AtomicBool::new(false),
        }
    }

    /// The most recently published active file, if any.
    pub fn active_file(&self) -> Option<Arc<ActiveFile>> {
        self.inner.read().active.clone()
    }

    pub fn publish_active(&self, file: Arc<ActiveFile>) {
        self.inner.write().active = Some(file);
    }

    pub fn observe(&self, name: &str, size: u64, now: Instant) -> Option<GrowthChange> {
        self.inner.write().tracker.observe(name, size, now)
    }

    pub fn mark_superseded(&self, name: &str) -> bool {
        self.inner.write().tracker.mark_superseded(name)
    }

    pub fn record_stopped(&self, name: &str, size: u64, last_size_change: Instant) {
        self.inner
            .write()
            .tracker
            .record_stopped(name, size, last_size_change);
    }

    /// Snapshot of the growth record for `name`.
    pub fn tracked(&self, name: &str) -> Option<TrackedFile> {
        self.inner.read().tracker.get(name).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.read().tracker.len()
    }

    /// Ask the monitor to forget all state on its next cycle.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
    }

    pub fn reset_pending(&self) -> bool {
        self.reset.load(Ordering::SeqCst)
    }

    /// Consume a pending reset. Only the monitor calls this.
    pub fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::SeqCst)
    }

    /// Drop every growth record and the active file.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tracker.clear();
        inner.active = None;
    }
}

impl GrowthState for RecordingStore {
    fn is_growing(&self, name: &str) -> bool {
        self.inner.read().tracker.is_growing(name)
    }

    fn is_stalled(&self, name: &str) -> bool {
        self.inner.read().tracker.is_stalled(name, Instant::now())
    }

    fn stall_timeout(&self) -> Duration {
        self.inner.read().tracker.stall_timeout()
    }
}
