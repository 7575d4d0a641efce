use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Growth record for one file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub name: String,
    pub last_known_size: u64,
    /// When `last_known_size` last changed.
    pub last_size_change: Instant,
    pub growing: bool,
}

/// A change of the growing flag reported by [`GrowthTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthChange {
    /// No size change within the stall timeout.
    Stopped,
    /// The size changed again after the file was considered stopped.
    Resumed,
}

/// Tracks file sizes over time and decides which files are still growing.
///
/// A file is growing while its size changed within `stall_timeout`. Time is
/// passed in by the caller so the rule can be exercised without sleeping.
#[derive(Debug)]
pub struct GrowthTracker {
    files: HashMap<String, TrackedFile>,
    stall_timeout: Duration,
}

impl GrowthTracker {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            files: HashMap::new(),
            stall_timeout,
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    /// Record the current size of `name` and recompute its growing flag.
    ///
    /// A first observation or a size change resets the change timestamp.
    /// Returns the flag transition, if any.
    pub fn observe(&mut self, name: &str, size: u64, now: Instant) -> Option<GrowthChange> {
        let stall_timeout = self.stall_timeout;
        let entry = self
            .files
            .entry(name.to_string())
            .or_insert_with(|| TrackedFile {
                name: name.to_string(),
                last_known_size: size,
                last_size_change: now,
                growing: true,
            });

        if entry.last_known_size != size {
            entry.last_known_size = size;
            entry.last_size_change = now;
        }

        let growing = now.saturating_duration_since(entry.last_size_change) <= stall_timeout;
        let change = match (entry.growing, growing) {
            (true, false) => Some(GrowthChange::Stopped),
            (false, true) => Some(GrowthChange::Resumed),
            _ => None,
        };
        entry.growing = growing;
        change
    }

    /// Force `name` to non-growing because a newer file took over.
    ///
    /// Returns `true` if the file was growing until now.
    pub fn mark_superseded(&mut self, name: &str) -> bool {
        match self.files.get_mut(name) {
            Some(file) => std::mem::replace(&mut file.growing, false),
            None => false,
        }
    }

    /// Seed a file that was already stopped when first seen.
    pub fn record_stopped(&mut self, name: &str, size: u64, last_size_change: Instant) {
        self.files.insert(
            name.to_string(),
            TrackedFile {
                name: name.to_string(),
                last_known_size: size,
                last_size_change,
                growing: false,
            },
        );
    }

    /// Unknown files count as growing: nothing proves them stalled yet.
    pub fn is_growing(&self, name: &str) -> bool {
        self.files.get(name).map_or(true, |file| file.growing)
    }

    /// True once `name` is non-growing and its size has been unchanged for at
    /// least the stall timeout.
    pub fn is_stalled(&self, name: &str, now: Instant) -> bool {
        self.files.get(name).is_some_and(|file| {
            !file.growing
                && now.saturating_duration_since(file.last_size_change) >= self.stall_timeout
        })
    }

    pub fn get(&self, name: &str) -> Option<&TrackedFile> {
        self.files.get(name)
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
