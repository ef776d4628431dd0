// SPDX-License-Identifier: Apache-2.0

//! Metadata-diffing watcher for filesystems that never emit notifications
//! (NFS, some overlay and FUSE mounts).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::traits::{FileEvent, FileWatcher, WatcherError};
use crate::receivers::container_logs::file_id::FileId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    modified: Option<SystemTime>,
    len: u64,
    id: Option<FileId>,
}

impl Snapshot {
    fn of(metadata: &fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            id: FileId::from_metadata(metadata),
        }
    }

    /// The name now refers to a different physical file.
    fn replaced_by(&self, other: &Snapshot) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a != b)
    }
}

/// Compares directory listings every `interval` and reports the difference.
///
/// Symlinks are followed, so a link retargeted at a new file looks like a
/// rename followed by a create.
pub struct PollWatcher {
    dirs: Vec<PathBuf>,
    files: HashSet<PathBuf>,
    known: HashMap<PathBuf, Snapshot>,
    interval: Duration,
    scanned_at: Instant,
    queued: Vec<FileEvent>,
}

impl PollWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            dirs: Vec::new(),
            files: HashSet::new(),
            known: HashMap::new(),
            interval,
            scanned_at: Instant::now(),
            queued: Vec::new(),
        }
    }

    fn covers(&self, path: &Path) -> bool {
        self.files.contains(path)
            || path
                .parent()
                .is_some_and(|parent| self.dirs.iter().any(|d| d == parent))
    }

    /// Current state of every covered regular file.
    fn snapshot(&self) -> HashMap<PathBuf, Snapshot> {
        let mut listed: Vec<&Path> = self.dirs.iter().map(PathBuf::as_path).collect();
        for parent in self.files.iter().filter_map(|f| f.parent()) {
            if !listed.contains(&parent) {
                listed.push(parent);
            }
        }

        let mut current = HashMap::with_capacity(self.known.len());
        for dir in listed {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = ?dir, error = %e, "Poll scan skipped directory");
                    continue;
                }
            };
            for path in entries.flatten().map(|entry| entry.path()) {
                if !self.covers(&path) {
                    continue;
                }
                if let Ok(metadata) = fs::metadata(&path) {
                    if metadata.is_file() {
                        current.insert(path, Snapshot::of(&metadata));
                    }
                }
            }
        }
        current
    }

    fn scan(&mut self) {
        let current = self.snapshot();

        for (path, now) in &current {
            match self.known.get(path) {
                None => self.queued.push(FileEvent::create(path.clone())),
                Some(before) if before.replaced_by(now) => {
                    self.queued.push(FileEvent::rename(path.clone()));
                    self.queued.push(FileEvent::create(path.clone()));
                }
                Some(before) if before != now => {
                    self.queued.push(FileEvent::modify(path.clone()))
                }
                Some(_) => {}
            }
        }
        for path in self.known.keys() {
            if !current.contains_key(path) {
                self.queued.push(FileEvent::remove(path.clone()));
            }
        }

        self.known = current;
        self.scanned_at = Instant::now();
    }

    fn scan_if_due(&mut self) {
        if self.scanned_at.elapsed() >= self.interval {
            self.scan();
        }
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            if !self.dirs.iter().any(|d| d == path) {
                self.dirs.push(path.to_path_buf());
            }
        } else {
            self.files.insert(path.to_path_buf());
        }

        // Whatever exists now is the baseline, not news
        for (path, state) in self.snapshot() {
            self.known.entry(path).or_insert(state);
        }
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.dirs.retain(|d| d != path);
        self.files.remove(path);
        let known = std::mem::take(&mut self.known);
        self.known = known.into_iter().filter(|(p, _)| self.covers(p)).collect();
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError> {
        self.scan_if_due();
        Ok(std::mem::take(&mut self.queued))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let deadline = Instant::now() + timeout;
        loop {
            let batch = self.try_recv()?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            let next_scan = self.scanned_at + self.interval;
            let wake = next_scan.min(deadline);
            std::thread::sleep(wake.saturating_duration_since(now).max(Duration::from_millis(1)));
        }
    }

    fn is_native(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
