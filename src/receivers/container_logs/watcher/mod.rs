// SPDX-License-Identifier: Apache-2.0

//! Change notifications for the log directory and for tailed files.
//!
//! [`NativeWatcher`] relies on the OS (inotify, FSEvents, kqueue).
//! [`PollWatcher`] compares metadata snapshots and serves filesystems that
//! never deliver notifications, such as NFS mounts.
//!
//! Discovery and every tailer build their own watcher, so events seen by a
//! tailer always belong to its file.

mod native;
mod poll;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{FileEvent, FileEventKind, FileWatcher, WatcherError};

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Native when it initializes, polling otherwise
    #[default]
    Auto,
    Native,
    Poll,
}

/// Build a watcher for `mode`. `poll_interval` drives the poll backend.
pub fn create_watcher(
    mode: WatchMode,
    poll_interval: Duration,
) -> Result<Box<dyn FileWatcher>, WatcherError> {
    match mode {
        WatchMode::Native => Ok(Box::new(NativeWatcher::new(poll_interval)?)),
        WatchMode::Poll => Ok(Box::new(PollWatcher::new(poll_interval))),
        WatchMode::Auto => match NativeWatcher::new(poll_interval) {
            Ok(watcher) => Ok(Box::new(watcher)),
            Err(e) => {
                tracing::warn!(error = %e, "Native watcher unavailable, polling instead");
                Ok(Box::new(PollWatcher::new(poll_interval)))
            }
        },
    }
}

/// Builds a fresh watcher for each owner (discovery or one tailer).
pub type WatcherFactory =
    Arc<dyn Fn() -> Result<Box<dyn FileWatcher>, WatcherError> + Send + Sync>;

pub fn watcher_factory(mode: WatchMode, poll_interval: Duration) -> WatcherFactory {
    Arc::new(move || create_watcher(mode, poll_interval))
}
