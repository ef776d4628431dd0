// SPDX-License-Identifier: Apache-2.0

//! Container log receiver.
//!
//! Discovers `pod_namespace_container.log` files written by the container
//! runtime, resolves the owning application from the pod name and tails each
//! physical file exactly once, forwarding decoded entries to an
//! [`EventSink`](crate::exporters::EventSink).

pub mod config;
pub mod decoder;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod file_id;
pub mod identity;
pub mod registry;
pub mod tailer;
pub mod watcher;

pub use config::{ContainerLogsConfig, StartAt, TailerConfig};
pub use discovery::DiscoveryEvent;
pub use entry::{LogEntry, SOURCE_INSTANCE, SourceCategory, SourceType, StreamKind};
pub use error::{AdmitError, DiscoveryError, IdentityError, TailerError};
pub use file_id::{FileId, FileIdentityProvider, InodeIdentity};
pub use identity::ProcessGuid;
pub use registry::SourceRegistry;
pub use tailer::{EntryStream, Tailer};
