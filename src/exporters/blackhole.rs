// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::exporters::{EventSink, SinkError};
use crate::receivers::container_logs::LogEntry;

/// Drops every entry, keeping only a count.
#[derive(Debug, Default)]
pub struct BlackholeSink {
    dropped: AtomicU64,
}

impl BlackholeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventSink for BlackholeSink {
    fn name(&self) -> &'static str {
        "blackhole"
    }

    async fn emit(&self, _entry: LogEntry) -> Result<(), SinkError> {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::container_logs::{SOURCE_INSTANCE, SourceType, StreamKind};

    #[tokio::test]
    async fn counts_dropped_entries() {
        let sink = BlackholeSink::new();
        let entry = LogEntry {
            message: b"hello".to_vec(),
            stream: StreamKind::Out,
            app_id: "app".to_string(),
            source_type: SourceType::App,
            source_instance: SOURCE_INSTANCE,
            timestamp_nanos: 1,
        };

        sink.emit(entry.clone()).await.unwrap();
        sink.emit(entry).await.unwrap();
        assert_eq!(sink.dropped(), 2);
    }
}
