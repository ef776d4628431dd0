// SPDX-License-Identifier: Apache-2.0

//! Destinations for decoded log entries.

pub mod blackhole;
pub mod memory;
pub mod stdout;

use async_trait::async_trait;
use std::io;
use thiserror::Error;

use crate::receivers::container_logs::LogEntry;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write entry: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("entry rejected: {0}")]
    Rejected(String),
}

/// Accepts decoded entries one at a time. Implementations do not retry;
/// callers log a failed delivery and move on to the next entry.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    async fn emit(&self, entry: LogEntry) -> Result<(), SinkError>;

    /// Flush buffered output before the process exits.
    async fn shutdown(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
