//! Recording directory monitor.
//!
//! Polls the recording directory, selects the most recently modified file as
//! the active stream, and keeps its growth record current. The loop runs
//! until cancelled; a single unreadable file or an empty directory only
//! skips the cycle.

pub mod store;
pub mod tracker;

pub use store::{ActiveFile, GrowthState, RecordingStore};
pub use tracker::{GrowthChange, GrowthTracker, TrackedFile};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tailcast_common::config::RecordingConfig;
use tailcast_common::format::{format_bytes, format_duration};
use tokio_util::sync::CancellationToken;

/// Names excluded from selection (artifacts of external tooling).
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub ignore_prefixes: Vec<String>,
    pub ignore_suffixes: Vec<String>,
}

impl FileFilter {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            ignore_prefixes: config.ignore_prefixes.clone(),
            ignore_suffixes: config.ignore_suffixes.clone(),
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        !self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            && !self.ignore_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }
}

/// A file found while scanning the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub name: String,
    pub len: u64,
    pub modified: SystemTime,
}

impl Candidate {
    fn into_active(self) -> ActiveFile {
        ActiveFile {
            path: self.path,
            name: self.name,
            modified: self.modified,
        }
    }
}

/// Find the most recently modified eligible regular file in `dir`.
///
/// Entries whose metadata cannot be read are skipped. Returns `Ok(None)` when
/// nothing qualifies.
pub fn find_latest(dir: &Path, filter: &FileFilter) -> std::io::Result<Option<Candidate>> {
    let mut latest: Option<Candidate> = None;

    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !filter.accepts(&name) {
            continue;
        }

        // Follows symlinks, like a plain stat of the path.
        let path = entry.path();
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };

        if latest.as_ref().map_or(true, |best| modified > best.modified) {
            latest = Some(Candidate {
                path,
                name,
                len: metadata.len(),
                modified,
            });
        }
    }

    Ok(latest)
}

/// Pick the recording directory below `base`.
///
/// Any subdirectory whose name starts with `prefix` qualifies; when several
/// do, the last one listed wins. Falls back to `base` itself.
pub fn find_recording_directory(base: &Path, prefix: &str) -> PathBuf {
    tracing::info!("Current directory is {}", base.display());

    let mut directory = base.to_path_buf();
    match std::fs::read_dir(base) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with(prefix) && entry.path().is_dir() {
                    directory = entry.path();
                    tracing::info!("Recording directory found: {}", directory.display());
                }
            }
        }
        Err(e) => {
            tracing::warn!("Failed to list {}: {e}", base.display());
        }
    }
    directory
}

/// Resolve the directory to monitor: the configured one, or discovery below
/// `base`.
pub fn resolve_recording_directory(config: &RecordingConfig, base: &Path) -> PathBuf {
    match &config.directory {
        Some(dir) => dir.clone(),
        None => find_recording_directory(base, &config.directory_prefix),
    }
}

/// Polling loop that owns the write side of a [`RecordingStore`].
pub struct DirectoryMonitor {
    dir: PathBuf,
    filter: FileFilter,
    store: Arc<RecordingStore>,
    poll_interval: Duration,
    stale_after: Duration,
    current: Option<Arc<ActiveFile>>,
}

impl DirectoryMonitor {
    pub fn new(dir: PathBuf, config: &RecordingConfig, store: Arc<RecordingStore>) -> Self {
        Self {
            dir,
            filter: FileFilter::from_config(config),
            store,
            poll_interval: config.poll_interval(),
            stale_after: config.stale_after(),
            current: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// The file selected by the last cycle.
    pub fn current(&self) -> Option<&Arc<ActiveFile>> {
        self.current.as_ref()
    }

    /// Run until `cancel` fires, polling once per interval.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            dir = %self.dir.display(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Recording monitor started"
        );

        let poll_interval = self.poll_interval;
        let mut monitor = self;
        loop {
            // Directory listing and stat calls block.
            monitor = match tokio::task::spawn_blocking(move || {
                monitor.poll_once();
                monitor
            })
            .await
            {
                Ok(monitor) => monitor,
                Err(e) => {
                    tracing::error!("Recording monitor poll failed: {e}");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("Recording monitor stopped");
    }

    /// One monitor cycle: honour a pending reset, select the newest file,
    /// update its growth record and publish it.
    pub fn poll_once(&mut self) {
        if self.store.take_reset() {
            if self.store.tracked_count() > 0 || self.current.is_some() {
                tracing::info!("Reset: discarding tracked files");
            }
            self.store.clear();
            self.current = None;
            return;
        }

        match find_latest(&self.dir, &self.filter) {
            Ok(Some(candidate)) => self.select(candidate),
            Ok(None) => tracing::trace!(dir = %self.dir.display(), "No recordings found"),
            Err(e) => tracing::debug!(dir = %self.dir.display(), "Failed to scan directory: {e}"),
        }

        let Some(current) = self.current.clone() else {
            return;
        };

        let size = match std::fs::metadata(&current.path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::debug!(file = %current.name, "Failed to stat active file: {e}");
                return;
            }
        };

        match self.store.observe(&current.name, size, Instant::now()) {
            Some(GrowthChange::Stopped) => {
                tracing::info!("Stream stopped: {} (filesize = {})", current.name, format_bytes(size));
            }
            Some(GrowthChange::Resumed) => {
                tracing::warn!("Stream resumed: {} (filesize = {})", current.name, format_bytes(size));
            }
            None => {}
        }

        self.store.publish_active(current);
    }

    fn select(&mut self, candidate: Candidate) {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.path == candidate.path)
        {
            return;
        }

        if let Some(previous) = self.current.take() {
            if self.store.mark_superseded(&previous.name) {
                tracing::info!("Stream stopped: {} (superseded by {})", previous.name, candidate.name);
            }
        }

        let age = SystemTime::now()
            .duration_since(candidate.modified)
            .unwrap_or_default();
        let stopped = age > self.stale_after;
        if stopped {
            let last_change = seed_instant(Instant::now(), age, self.store.stall_timeout());
            self.store
                .record_stopped(&candidate.name, candidate.len, last_change);
        }

        tracing::info!(
            "{} found: {} (filesize = {}, last modified = {} ago)",
            if stopped { "Stopped stream" } else { "Stream" },
            candidate.name,
            format_bytes(candidate.len),
            format_duration(age)
        );

        self.current = Some(Arc::new(candidate.into_active()));
    }
}

/// Instant of the last size change of a file last modified `age` ago.
///
/// When the clock cannot reach back that far, settle for just over one stall
/// timeout so the file still counts as stopped.
fn seed_instant(now: Instant, age: Duration, stall_timeout: Duration) -> Instant {
    now.checked_sub(age)
        .or_else(|| now.checked_sub(stall_timeout + Duration::from_secs(1)))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;

    fn set_age(path: &Path, secs_ago: i64) {
        let now = FileTime::now();
        let mtime = FileTime::from_unix_time(now.unix_seconds() - secs_ago, 0);
        set_file_mtime(path, mtime).unwrap();
    }

    fn default_filter() -> FileFilter {
        FileFilter::from_config(&RecordingConfig::default())
    }

    fn monitor_for(dir: &Path) -> (DirectoryMonitor, Arc<RecordingStore>) {
        let config = RecordingConfig::default();
        let store = Arc::new(RecordingStore::new(config.stall_timeout()));
        let monitor = DirectoryMonitor::new(dir.to_path_buf(), &config, store.clone());
        (monitor, store)
    }

    #[test]
    fn filter_rejects_reserved_names() {
        let filter = default_filter();
        assert!(filter.accepts("stream.flv"));
        assert!(!filter.accepts("stream.flv_"));
        assert!(!filter.accepts("Copy of stream.flv"));
    }

    #[test]
    fn latest_picks_newest_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.flv");
        let b = dir.path().join("b.flv");
        fs::write(&a, b"aaaa").unwrap();
        fs::write(&b, b"bb").unwrap();
        set_age(&a, 20);
        set_age(&b, 10);

        let latest = find_latest(dir.path(), &default_filter()).unwrap().unwrap();
        assert_eq!(latest.name, "b.flv");
        assert_eq!(latest.len, 2);
    }

    #[test]
    fn latest_skips_reserved_names_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("a.flv");
        fs::write(&real, b"a").unwrap();
        set_age(&real, 100);
        fs::write(dir.path().join("a.flv_"), b"tmp").unwrap();
        fs::write(dir.path().join("Copy of a.flv"), b"copy").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let latest = find_latest(dir.path(), &default_filter()).unwrap().unwrap();
        assert_eq!(latest.name, "a.flv");
    }

    #[test]
    fn latest_in_empty_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_latest(dir.path(), &default_filter()).unwrap().is_none());
    }

    #[test]
    fn latest_in_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(find_latest(&missing, &default_filter()).is_err());
    }

    #[test]
    fn recording_directory_discovery() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("LocalRecording 2024")).unwrap();
        fs::write(base.path().join("LocalRecording.txt"), b"not a dir").unwrap();

        let dir = find_recording_directory(base.path(), "LocalRecording");
        assert_eq!(dir, base.path().join("LocalRecording 2024"));
    }

    #[test]
    fn recording_directory_falls_back_to_base() {
        let base = tempfile::tempdir().unwrap();
        let dir = find_recording_directory(base.path(), "LocalRecording");
        assert_eq!(dir, base.path());
    }

    #[test]
    fn configured_directory_overrides_discovery() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("LocalRecording")).unwrap();
        let config = RecordingConfig {
            directory: Some(PathBuf::from("/srv/explicit")),
            ..Default::default()
        };
        assert_eq!(
            resolve_recording_directory(&config, base.path()),
            PathBuf::from("/srv/explicit")
        );
    }

    #[test]
    fn poll_publishes_newest_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.flv");
        let b = dir.path().join("b.flv");
        fs::write(&a, vec![0u8; 100]).unwrap();
        fs::write(&b, vec![0u8; 1000]).unwrap();
        set_age(&a, 2);
        set_age(&b, 1);

        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();

        let active = store.active_file().unwrap();
        assert_eq!(active.name, "b.flv");
        assert!(store.is_growing("b.flv"));
        assert_eq!(store.tracked("b.flv").unwrap().last_known_size, 1000);
    }

    #[test]
    fn empty_directory_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();
        assert!(store.active_file().is_none());
        assert!(monitor.current().is_none());
    }

    #[test]
    fn switching_files_stops_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.flv");
        fs::write(&a, b"first").unwrap();
        set_age(&a, 2);

        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();
        assert_eq!(store.active_file().unwrap().name, "a.flv");
        assert!(store.is_growing("a.flv"));

        let b = dir.path().join("b.flv");
        fs::write(&b, b"second").unwrap();
        monitor.poll_once();

        assert_eq!(store.active_file().unwrap().name, "b.flv");
        assert!(!store.is_growing("a.flv"));
        assert!(store.is_growing("b.flv"));
    }

    #[test]
    fn stale_candidate_is_seeded_as_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.flv");
        fs::write(&old, b"done").unwrap();
        set_age(&old, 120);

        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();

        assert_eq!(store.active_file().unwrap().name, "old.flv");
        assert!(!store.is_growing("old.flv"));
    }

    #[test]
    fn reset_discards_state_then_rediscovers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.flv"), b"data").unwrap();

        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();
        assert!(store.active_file().is_some());

        store.request_reset();
        monitor.poll_once();
        assert!(store.active_file().is_none());
        assert_eq!(store.tracked_count(), 0);
        assert!(monitor.current().is_none());
        assert!(!store.reset_pending());

        monitor.poll_once();
        assert_eq!(store.active_file().unwrap().name, "a.flv");
    }

    #[test]
    fn vanished_file_keeps_previous_publication() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.flv");
        fs::write(&a, b"data").unwrap();

        let (mut monitor, store) = monitor_for(dir.path());
        monitor.poll_once();
        fs::remove_file(&a).unwrap();

        // Stat fails and the directory is empty: the cycle is skipped.
        monitor.poll_once();
        assert_eq!(store.active_file().unwrap().name, "a.flv");
    }

    #[test]
    fn unreachable_age_still_seeds_a_stopped_file() {
        let stall = Duration::from_millis(50);
        let now = Instant::now();
        let seeded = seed_instant(now, Duration::MAX, stall);
        assert!(now.duration_since(seeded) > stall);

        let store = RecordingStore::new(stall);
        store.record_stopped("old.flv", 10, seeded);
        assert_ne!(store.observe("old.flv", 10, now), Some(GrowthChange::Resumed));
        assert!(!store.is_growing("old.flv"));
    }

    #[test]
    fn reachable_age_is_used_as_is() {
        let now = Instant::now();
        let seeded = seed_instant(now, Duration::from_millis(20), Duration::from_secs(5));
        assert_eq!(now.duration_since(seeded), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.flv"), b"data").unwrap();

        let config = RecordingConfig {
            poll_interval_ms: 10,
            ..Default::default()
        };
        let store = Arc::new(RecordingStore::new(config.stall_timeout()));
        let monitor = DirectoryMonitor::new(dir.path().to_path_buf(), &config, store.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.active_file().unwrap().name, "a.flv");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
