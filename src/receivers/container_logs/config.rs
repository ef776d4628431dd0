// SPDX-License-Identifier: Apache-2.0

//! Configuration for the container log receiver.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::container_logs::watcher::WatchMode;

pub const DEFAULT_LOG_DIR: &str = "/var/log/containers";
pub const DEFAULT_QUEUE_SIZE: usize = 4096;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where a new tailer starts reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Read the whole file
    #[default]
    Beginning,
    /// Only read what is appended from now on
    End,
    /// A byte offset already resolved against the open file
    At(u64),
}

impl StartAt {
    pub fn from_tail(tail: bool) -> Self {
        if tail { StartAt::End } else { StartAt::Beginning }
    }

    /// Move `file` to the start position and return it as an offset, so
    /// content written after this call is not skipped however late reading
    /// begins.
    pub fn pin(self, file: &mut File) -> io::Result<u64> {
        match self {
            StartAt::Beginning => file.seek(SeekFrom::Start(0)),
            StartAt::End => file.seek(SeekFrom::End(0)),
            StartAt::At(offset) => file.seek(SeekFrom::Start(offset)),
        }
    }
}

/// Settings every tailer is started with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailerConfig {
    pub watch_mode: WatchMode,
    /// Poll interval for poll mode, also the wait granularity between
    /// checks that the consumer is still listening
    pub poll_interval: Duration,
    /// Capacity of the entry queue between a tailer and its drain task
    pub queue_size: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            watch_mode: WatchMode::Auto,
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerLogsConfig {
    /// Directory the container runtime writes `pod_namespace_container.log` files into
    pub log_dir: PathBuf,
    pub watch_mode: WatchMode,
    pub poll_interval: Duration,
    pub queue_size: usize,
}

impl Default for ContainerLogsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            watch_mode: WatchMode::Auto,
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl ContainerLogsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.log_dir.as_os_str().is_empty() {
            return Err("A log directory must be specified".to_string());
        }
        if self.queue_size == 0 {
            return Err("Queue size must be greater than zero".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            watch_mode: self.watch_mode,
            poll_interval: self.poll_interval,
            queue_size: self.queue_size,
        }
    }
}
