// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::exporters::EventSink;
use crate::receivers::container_logs::discovery::{self, DiscoveryEvent};
use crate::receivers::container_logs::watcher::{WatcherFactory, watcher_factory};
use crate::receivers::container_logs::{AdmitError, ContainerLogsConfig, SourceRegistry};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects directory discovery to the source registry.
pub struct Agent {
    config: ContainerLogsConfig,
    sink: Arc<dyn EventSink>,
    shutdown_timeout: Duration,
    watchers: Option<WatcherFactory>,
}

impl Agent {
    pub fn new(config: ContainerLogsConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            watchers: None,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the watchers built from the configured watch mode, for both
    /// directory discovery and the tailers.
    pub fn with_watcher_factory(mut self, watchers: WatcherFactory) -> Self {
        self.watchers = Some(watchers);
        self
    }

    /// Run until `cancel` fires or the directory watch ends. The latter is
    /// an error: the watch is never restarted.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        info!(
            log_dir = ?self.config.log_dir,
            watch_mode = ?self.config.watch_mode,
            exporter = self.sink.name(),
            "Starting podtail."
        );

        let watchers = self
            .watchers
            .clone()
            .unwrap_or_else(|| watcher_factory(self.config.watch_mode, self.config.poll_interval));
        let mut events =
            discovery::watch_with(&self.config.log_dir, &watchers, self.config.poll_interval)?;
        let registry = SourceRegistry::new(self.sink.clone(), self.config.tailer_config())
            .with_watcher_factory(watchers);

        let result: Result<(), BoxError> = loop {
            select! {
                _ = cancel.cancelled() => {
                    info!("Stopping log discovery.");
                    break Ok(());
                },
                event = events.next() => match event {
                    Some(event) => admit(&registry, event),
                    None => break Err("log directory watcher terminated".into()),
                },
            }
        };
        drop(events);

        if !registry.wait_for_drains(self.shutdown_timeout).await {
            debug!(tailers = registry.len(), "Leaving tailers running");
        }
        if let Err(e) = self.sink.shutdown().await {
            warn!(sink = self.sink.name(), error = %e, "Failed to shut down sink");
        }

        result
    }
}

fn admit(registry: &SourceRegistry, event: DiscoveryEvent) {
    let tail = event.existed_at_start();
    match registry.admit(&event.pod, &event.container, &event.path, tail) {
        Ok(()) => {}
        Err(AdmitError::UnsupportedSourceName(container)) => {
            debug!(path = ?event.path, container = %container, "Ignoring unsupported log source");
        }
        Err(e) => {
            warn!(
                path = ?event.path,
                pod = %event.pod,
                error = %e,
                "Failed to admit log file"
            );
        }
    }
}
