// SPDX-License-Identifier: Apache-2.0

//! Kernel-backed watcher built on `notify`'s recommended backend.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

#[cfg(target_os = "linux")]
const BACKEND: &str = "inotify";
#[cfg(target_os = "macos")]
const BACKEND: &str = "FSEvents";
#[cfg(target_os = "windows")]
const BACKEND: &str = "ReadDirectoryChangesW";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const BACKEND: &str = "native";

type Notification = Result<Event, notify::Error>;

pub struct NativeWatcher {
    inner: RecommendedWatcher,
    notifications: Receiver<Notification>,
}

impl NativeWatcher {
    /// `poll_interval` is only consulted if notify falls back to its own
    /// polling on an unsupported platform.
    pub fn new(poll_interval: Duration) -> Result<Self, WatcherError> {
        let (tx, notifications) = mpsc::channel();
        let inner = RecommendedWatcher::new(
            move |n: Notification| {
                // Receiver gone means the watcher is being dropped
                let _ = tx.send(n);
            },
            Config::default().with_poll_interval(poll_interval),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            inner,
            notifications,
        })
    }

    fn convert_event(event: Event) -> Option<FileEvent> {
        if event.paths.is_empty() {
            return None;
        }
        let kind = match event.kind {
            EventKind::Access(_) => return None,
            // A name moved into a watched directory is a new entry there
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                FileEventKind::Create
            }
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
            EventKind::Modify(_) => FileEventKind::Modify,
            EventKind::Remove(_) => FileEventKind::Remove,
            EventKind::Any | EventKind::Other => FileEventKind::Other,
        };
        Some(FileEvent::new(kind, event.paths))
    }

    fn push(batch: &mut Vec<FileEvent>, n: Notification) -> Result<(), WatcherError> {
        let event = n.map_err(|e| WatcherError::Channel(e.to_string()))?;
        batch.extend(Self::convert_event(event));
        Ok(())
    }

    fn disconnected() -> WatcherError {
        WatcherError::Channel("notify sender dropped".into())
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.inner
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch(format!("{}: {}", path.display(), e)))
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.inner
            .unwatch(path)
            .map_err(|e| WatcherError::Watch(format!("{}: {}", path.display(), e)))
    }

    fn try_recv(&mut self) -> Result<Vec<FileEvent>, WatcherError> {
        let mut batch = Vec::new();
        for n in self.notifications.try_iter() {
            Self::push(&mut batch, n)?;
        }
        Ok(batch)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<FileEvent>, WatcherError> {
        let deadline = Instant::now() + timeout;
        let mut batch = Vec::new();

        // Filtered notifications (access) must not end the wait early
        while batch.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.notifications.recv_timeout(left) {
                Ok(n) => Self::push(&mut batch, n)?,
                Err(RecvTimeoutError::Timeout) => return Ok(batch),
                Err(RecvTimeoutError::Disconnected) => return Err(Self::disconnected()),
            }
        }

        batch.extend(self.try_recv()?);
        Ok(batch)
    }

    fn is_native(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
