// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Container identity does not carry an instance index, so every entry
/// reports the same placeholder.
pub const SOURCE_INSTANCE: &str = "??";

const APPLICATION_PREFIX: &str = "application-";
const STAGING_PREFIX: &str = "staging-";

/// Output stream a record was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Out,
    Err,
}

impl StreamKind {
    /// Runtime `stream` field: `"err"` is stderr, anything else stdout.
    pub fn from_field(stream: &str) -> Self {
        if stream == "err" {
            StreamKind::Err
        } else {
            StreamKind::Out
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Out => "OUT",
            StreamKind::Err => "ERR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    App,
    Stg,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::App => "APP",
            SourceType::Stg => "STG",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a container log, derived from the container (source) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    Application,
    Staging,
    Unsupported,
}

impl SourceCategory {
    pub fn classify(source_label: &str) -> Self {
        if source_label.starts_with(APPLICATION_PREFIX) {
            SourceCategory::Application
        } else if source_label.starts_with(STAGING_PREFIX) {
            SourceCategory::Staging
        } else {
            SourceCategory::Unsupported
        }
    }

    pub fn source_type(&self) -> Option<SourceType> {
        match self {
            SourceCategory::Application => Some(SourceType::App),
            SourceCategory::Staging => Some(SourceType::Stg),
            SourceCategory::Unsupported => None,
        }
    }
}

/// One decoded log record, ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: Vec<u8>,
    pub stream: StreamKind,
    pub app_id: String,
    pub source_type: SourceType,
    pub source_instance: &'static str,
    /// Record's own `time` field, nanoseconds since the Unix epoch
    pub timestamp_nanos: i64,
}

impl LogEntry {
    pub fn message_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_source_label() {
        assert_eq!(
            SourceCategory::classify("application-web"),
            SourceCategory::Application
        );
        assert_eq!(
            SourceCategory::classify("staging-build_step"),
            SourceCategory::Staging
        );
        assert_eq!(
            SourceCategory::classify("sidecar-XXX"),
            SourceCategory::Unsupported
        );
        // Prefix must include the dash
        assert_eq!(
            SourceCategory::classify("application"),
            SourceCategory::Unsupported
        );
    }

    #[test]
    fn test_category_source_type() {
        assert_eq!(
            SourceCategory::Application.source_type(),
            Some(SourceType::App)
        );
        assert_eq!(SourceCategory::Staging.source_type(), Some(SourceType::Stg));
        assert_eq!(SourceCategory::Unsupported.source_type(), None);
        assert_eq!(SourceType::Stg.to_string(), "STG");
    }

    #[test]
    fn test_stream_kind_from_field() {
        assert_eq!(StreamKind::from_field("err"), StreamKind::Err);
        assert_eq!(StreamKind::from_field("out"), StreamKind::Out);
        assert_eq!(StreamKind::from_field(""), StreamKind::Out);
        assert_eq!(StreamKind::from_field("stderr"), StreamKind::Out);
    }
}
