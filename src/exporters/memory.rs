// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::exporters::{EventSink, SinkError};
use crate::receivers::container_logs::LogEntry;

/// Keeps every entry in memory. Used to inspect what a pipeline delivered.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
    rejecting: AtomicBool,
    rejected: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every emit fails and nothing is recorded.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Number of emits refused while rejecting.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn emit(&self, entry: LogEntry) -> Result<(), SinkError> {
        if self.rejecting.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SinkError::Rejected("memory sink is rejecting".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SinkError::Rejected("memory sink poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }
}
