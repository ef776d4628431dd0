// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::receivers::container_logs::watcher::WatcherError;

/// The shortened workload identity embedded in a pod name could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid shortened process guid: {0}")]
    InvalidIdentityEncoding(String),
}

/// Reasons a discovered log file is not admitted for tailing.
#[derive(Error, Debug)]
pub enum AdmitError {
    #[error("unsupported source name: {0}")]
    UnsupportedSourceName(String),

    #[error("invalid pod name: {0}")]
    InvalidPodName(String),

    #[error("invalid process guid in pod name {pod}: {source}")]
    InvalidProcessGuid {
        pod: String,
        #[source]
        source: IdentityError,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to determine file identity of {path}: {source}")]
    InvalidInode {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal error reported at the end of a tailer's entry sequence.
#[derive(Error, Debug)]
pub enum TailerError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: WatcherError,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed log record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("notification channel failed: {0}")]
    NotificationChannel(WatcherError),
}

/// The directory watch could not be established.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to start watching {path}: {source}")]
    Start {
        path: PathBuf,
        #[source]
        source: WatcherError,
    },
}

pub type Result<T> = std::result::Result<T, AdmitError>;
