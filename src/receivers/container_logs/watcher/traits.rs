// SPDX-License-Identifier: Apache-2.0

//! Watcher abstraction shared by discovery and the tailers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("could not start watcher: {0}")]
    Init(String),
    #[error("could not register watch: {0}")]
    Watch(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Notifications stopped arriving; the watcher is unusable afterwards
    #[error("notification channel closed: {0}")]
    Channel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    /// Appended, truncated or metadata touched
    Modify,
    Remove,
    /// Moved away from or onto the reported path
    Rename,
    Other,
}

impl FileEventKind {
    /// Whether the event means the watched name no longer refers to the file.
    pub fn is_remove_or_rename(self) -> bool {
        matches!(self, FileEventKind::Remove | FileEventKind::Rename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub paths: Vec<PathBuf>,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }

    pub fn create(path: PathBuf) -> Self {
        Self::new(FileEventKind::Create, vec![path])
    }

    pub fn modify(path: PathBuf) -> Self {
        Self::new(FileEventKind::Modify, vec![path])
    }

    pub fn remove(path: PathBuf) -> Self {
        Self::new(FileEventKind::Remove, vec![path])
    }

    pub fn rename(path: PathBuf) -> Self {
        Self::new(FileEventKind::Rename, vec![path])
    }

    /// Whether any of the affected paths is `path`.
    pub fn concerns(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

/// Source of change notifications for a directory or a single file.
///
/// Each watcher has one owner (the discovery thread or one tailer thread),
/// which is why every call takes `&mut self`.
pub trait FileWatcher: Send {
    /// Start reporting `path`. A directory reports its entries, a file
    /// reports itself.
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError>;

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Drain what has been observed so far.
    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError>;

    /// Wait up to `timeout` for at least one event. An empty batch means
    /// the timeout elapsed.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError>;

    fn is_native(&self) -> bool;

    /// Backend label used in log fields.
    fn backend_name(&self) -> &'static str;
}
