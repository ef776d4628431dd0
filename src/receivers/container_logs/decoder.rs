// SPDX-License-Identifier: Apache-2.0

//! Incremental decoding of the container runtime's JSON log stream.
//!
//! The runtime appends one JSON object per record. A read can end in the
//! middle of a record when the writer has only flushed part of it, so every
//! attempt reports one of three outcomes: a decoded record, a request for
//! more data (with the bytes to retry later), or a malformed stream.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::{self, Visitor};
use serde_json::Deserializer;

use crate::receivers::container_logs::entry::{LogEntry, SOURCE_INSTANCE, SourceType, StreamKind};

/// A record as written by the container runtime's json-file logger.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct JsonLogRecord {
    /// Invalid UTF-8 is replaced with U+FFFD rather than failing the record
    #[serde(default, deserialize_with = "lossy_string")]
    pub log: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl JsonLogRecord {
    /// Nanoseconds since the epoch; 0 when the record has no usable time.
    pub fn timestamp_nanos(&self) -> i64 {
        self.time
            .and_then(|t| t.timestamp_nanos_opt())
            .unwrap_or_default()
    }

    pub fn into_entry(self, app_id: &str, source_type: SourceType) -> LogEntry {
        LogEntry {
            stream: StreamKind::from_field(&self.stream),
            timestamp_nanos: self.timestamp_nanos(),
            message: self.log.into_bytes(),
            app_id: app_id.to_string(),
            source_type,
            source_instance: SOURCE_INSTANCE,
        }
    }
}

fn lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Lossy;

    impl Visitor<'_> for Lossy {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<String, E> {
            Ok(String::from_utf8_lossy(v).into_owned())
        }
    }

    // serde_json hands strings to deserialize_bytes unvalidated
    deserializer.deserialize_bytes(Lossy)
}

#[derive(Debug)]
pub enum DecodeOutcome {
    /// One complete record.
    Value(JsonLogRecord),
    /// The input is used up. Holds the bytes of a started but incomplete
    /// record, empty when the input ended cleanly between records.
    NeedMoreData(Vec<u8>),
    /// The input is not a stream of log records.
    Malformed(serde_json::Error),
}

/// Decodes records from `carry-over ++ newly read bytes`.
#[derive(Debug, Default)]
pub struct IncrementalDecoder {
    buf: Vec<u8>,
    pos: usize,
}

impl IncrementalDecoder {
    /// Start from bytes left over by the previous attempt.
    pub fn new(carry_over: Vec<u8>) -> Self {
        Self {
            buf: carry_over,
            pos: 0,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes not yet consumed by a decoded record.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn next_record(&mut self) -> DecodeOutcome {
        let (next, consumed) = {
            let mut stream =
                Deserializer::from_slice(&self.buf[self.pos..]).into_iter::<JsonLogRecord>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            Some(Ok(record)) => {
                self.pos += consumed;
                DecodeOutcome::Value(record)
            }
            // Only whitespace left
            None => {
                self.reset();
                DecodeOutcome::NeedMoreData(Vec::new())
            }
            Some(Err(e)) if e.is_eof() => {
                let partial = self.buf.split_off(self.pos);
                self.reset();
                DecodeOutcome::NeedMoreData(partial)
            }
            Some(Err(e)) => DecodeOutcome::Malformed(e),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STDOUT_RECORD: &str =
        r#"{"log":"a stdout message","stream":"out","time":"2009-11-10T23:00:00Z"}"#;
    const STDERR_RECORD: &str =
        r#"{"log":"a stderr message","stream":"err","time":"2009-11-10T23:00:00Z"}"#;

    fn expect_value(decoder: &mut IncrementalDecoder) -> JsonLogRecord {
        match decoder.next_record() {
            DecodeOutcome::Value(record) => record,
            other => panic!("expected a record, got {:?}", other),
        }
    }

    fn expect_need_more(decoder: &mut IncrementalDecoder) -> Vec<u8> {
        match decoder.next_record() {
            DecodeOutcome::NeedMoreData(rest) => rest,
            other => panic!("expected NeedMoreData, got {:?}", other),
        }
    }

    #[test]
    fn test_decodes_consecutive_records() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(format!("{}\n{}\n", STDOUT_RECORD, STDERR_RECORD).as_bytes());

        let first = expect_value(&mut decoder);
        assert_eq!(first.log, "a stdout message");
        assert_eq!(first.stream, "out");
        assert_eq!(first.timestamp_nanos(), 1257894000000000000);

        let second = expect_value(&mut decoder);
        assert_eq!(second.log, "a stderr message");
        assert_eq!(second.stream, "err");

        assert!(expect_need_more(&mut decoder).is_empty());
    }

    #[test]
    fn test_pretty_printed_records_span_lines() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(
            b"{\n\t\"log\": \"a stdout message\",\n\t\"stream\": \"out\",\n\t\"time\": \"2009-11-10T23:00:00Z\"\n}\n",
        );

        assert_eq!(expect_value(&mut decoder).log, "a stdout message");
        assert!(expect_need_more(&mut decoder).is_empty());
    }

    #[test]
    fn test_partial_record_is_carried_over() {
        let cut = STDERR_RECORD.len() / 2;
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(format!("{}\n{}", STDOUT_RECORD, &STDERR_RECORD[..cut]).as_bytes());

        assert_eq!(expect_value(&mut decoder).log, "a stdout message");
        let carry = expect_need_more(&mut decoder);
        assert!(carry.ends_with(STDERR_RECORD[..cut].as_bytes()));
        assert!(decoder.remaining().is_empty());

        // Next attempt: carry-over followed by the rest of the record
        let mut decoder = IncrementalDecoder::new(carry);
        decoder.feed(STDERR_RECORD[cut..].as_bytes());
        let record = expect_value(&mut decoder);
        assert_eq!(record.log, "a stderr message");
        assert_eq!(StreamKind::from_field(&record.stream), StreamKind::Err);
    }

    #[test]
    fn test_split_inside_string_escape() {
        let record = r#"{"log":"quote \" inside","stream":"out","time":"2009-11-10T23:00:00Z"}"#;
        let cut = record.find('\\').unwrap() + 1;

        let mut decoder = IncrementalDecoder::default();
        decoder.feed(record[..cut].as_bytes());
        let carry = expect_need_more(&mut decoder);

        let mut decoder = IncrementalDecoder::new(carry);
        decoder.feed(record[cut..].as_bytes());
        assert_eq!(expect_value(&mut decoder).log, "quote \" inside");
    }

    #[test]
    fn test_malformed_input() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(b"not json at all\n");

        assert!(matches!(
            decoder.next_record(),
            DecodeOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(br#"{"log": 42, "stream": "out"}"#);

        assert!(matches!(
            decoder.next_record(),
            DecodeOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_invalid_utf8_in_log_is_replaced() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(b"{\"log\":\"bad \xff byte\",\"stream\":\"out\"}\n");
        decoder.feed(br#"{"log":"caf\u00e9","stream":"out"}"#);

        assert_eq!(expect_value(&mut decoder).log, "bad \u{FFFD} byte");
        assert_eq!(expect_value(&mut decoder).log, "caf\u{e9}");
    }

    #[test]
    fn test_missing_fields_default() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(br#"{"log":"only a message"}"#);

        let record = expect_value(&mut decoder);
        assert_eq!(record.timestamp_nanos(), 0);
        assert_eq!(StreamKind::from_field(&record.stream), StreamKind::Out);
    }

    #[test]
    fn test_into_entry() {
        let record = JsonLogRecord {
            log: "hello".to_string(),
            stream: "err".to_string(),
            time: Some("2009-11-10T23:00:00.5Z".parse().unwrap()),
        };

        let entry = record.into_entry("app-id", SourceType::Stg);
        assert_eq!(entry.message, b"hello");
        assert_eq!(entry.stream, StreamKind::Err);
        assert_eq!(entry.app_id, "app-id");
        assert_eq!(entry.source_type, SourceType::Stg);
        assert_eq!(entry.source_instance, "??");
        assert_eq!(entry.timestamp_nanos, 1257894000500000000);
    }

    #[test]
    fn test_offset_time_is_normalized_to_utc() {
        let mut decoder = IncrementalDecoder::default();
        decoder.feed(br#"{"log":"x","stream":"out","time":"2009-11-10T18:00:00-05:00"}"#);

        assert_eq!(
            expect_value(&mut decoder).timestamp_nanos(),
            1257894000000000000
        );
    }
}
