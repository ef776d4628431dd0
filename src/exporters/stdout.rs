// SPDX-License-Identifier: Apache-2.0

//! Writes one line per entry, either human readable or as JSON.

use async_trait::async_trait;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::exporters::{EventSink, SinkError};
use crate::receivers::container_logs::LogEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdoutFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: i64,
    app_id: &'a str,
    source_type: &'a str,
    source_instance: &'a str,
    stream: &'a str,
    message: &'a str,
}

pub struct StdoutSink {
    format: StdoutFormat,
    writer: Mutex<Box<dyn Write + Send>>,
    emitted: AtomicU64,
}

impl StdoutSink {
    pub fn new(format: StdoutFormat) -> Self {
        Self::with_writer(format, Box::new(io::stdout()))
    }

    pub fn with_writer(format: StdoutFormat, writer: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            writer: Mutex::new(writer),
            emitted: AtomicU64::new(0),
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    fn render(&self, entry: &LogEntry) -> Result<String, SinkError> {
        let message = entry.message_lossy();
        match self.format {
            StdoutFormat::Text => Ok(format!(
                "{} {}/{} {} {} {}",
                entry.timestamp_nanos,
                entry.source_type,
                entry.source_instance,
                entry.app_id,
                entry.stream.as_str(),
                message.trim_end_matches('\n'),
            )),
            StdoutFormat::Json => Ok(serde_json::to_string(&JsonLine {
                timestamp: entry.timestamp_nanos,
                app_id: &entry.app_id,
                source_type: entry.source_type.as_str(),
                source_instance: entry.source_instance,
                stream: entry.stream.as_str(),
                message: &message,
            })?),
        }
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn Write + Send>>, SinkError> {
        self.writer
            .lock()
            .map_err(|_| SinkError::Rejected("stdout writer poisoned".to_string()))
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn emit(&self, entry: LogEntry) -> Result<(), SinkError> {
        let line = self.render(&entry)?;
        {
            let mut writer = self.lock_writer()?;
            writeln!(writer, "{}", line)?;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        self.lock_writer()?.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::container_logs::{SOURCE_INSTANCE, SourceType, StreamKind};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn entry() -> LogEntry {
        LogEntry {
            message: b"a stderr message\n".to_vec(),
            stream: StreamKind::Err,
            app_id: "8d0f2b6a-3c1e-4f5a-9b7d-2e6c1a4f8b90".to_string(),
            source_type: SourceType::App,
            source_instance: SOURCE_INSTANCE,
            timestamp_nanos: 1257894000000000000,
        }
    }

    #[tokio::test]
    async fn writes_text_lines() {
        let buf = SharedBuf::default();
        let sink = StdoutSink::with_writer(StdoutFormat::Text, Box::new(buf.clone()));

        sink.emit(entry()).await.unwrap();

        assert_eq!(
            buf.contents(),
            "1257894000000000000 APP/?? 8d0f2b6a-3c1e-4f5a-9b7d-2e6c1a4f8b90 ERR a stderr message\n"
        );
        assert_eq!(sink.emitted(), 1);
    }

    #[tokio::test]
    async fn writes_json_lines() {
        let buf = SharedBuf::default();
        let sink = StdoutSink::with_writer(StdoutFormat::Json, Box::new(buf.clone()));

        sink.emit(entry()).await.unwrap();
        sink.shutdown().await.unwrap();

        let contents = buf.contents();
        let value: serde_json::Value = serde_json::from_str(contents.trim_end()).unwrap();
        assert_eq!(value["timestamp"], 1257894000000000000i64);
        assert_eq!(value["source_type"], "APP");
        assert_eq!(value["source_instance"], "??");
        assert_eq!(value["stream"], "ERR");
        assert_eq!(value["message"], "a stderr message\n");
    }
}
