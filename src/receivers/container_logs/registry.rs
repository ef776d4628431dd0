// SPDX-License-Identifier: Apache-2.0

//! Admission of discovered log files.
//!
//! The registry maps each physical file (by [`FileId`]) to the one tailer
//! following it. Admission decodes the owning application from the pod name,
//! opens the file and starts a tailer plus a drain task forwarding its
//! entries to the sink. The drain task removes the file from the registry
//! once the tailer's sequence ends, so a later discovery of the same file
//! can start a new tailer.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::exporters::EventSink;
use crate::receivers::container_logs::config::{StartAt, TailerConfig};
use crate::receivers::container_logs::entry::{SourceCategory, SourceType};
use crate::receivers::container_logs::error::{AdmitError, Result};
use crate::receivers::container_logs::file_id::{FileId, FileIdentityProvider, InodeIdentity};
use crate::receivers::container_logs::identity::ProcessGuid;
use crate::receivers::container_logs::tailer::{EntryStream, Tailer};
use crate::receivers::container_logs::watcher::{WatcherFactory, watcher_factory};

/// What the registry knows about a running tailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerHandle {
    pub path: PathBuf,
    pub pod: String,
    pub app_id: String,
    pub source_type: SourceType,
}

type TailerMap = HashMap<FileId, TailerHandle>;

pub struct SourceRegistry {
    sink: Arc<dyn EventSink>,
    identity: Arc<dyn FileIdentityProvider>,
    config: TailerConfig,
    watchers: WatcherFactory,
    tailers: Arc<Mutex<TailerMap>>,
    drains: Mutex<JoinSet<()>>,
}

impl SourceRegistry {
    pub fn new(sink: Arc<dyn EventSink>, config: TailerConfig) -> Self {
        Self::with_identity_provider(sink, config, Arc::new(InodeIdentity))
    }

    pub fn with_identity_provider(
        sink: Arc<dyn EventSink>,
        config: TailerConfig,
        identity: Arc<dyn FileIdentityProvider>,
    ) -> Self {
        Self {
            sink,
            identity,
            config,
            watchers: watcher_factory(config.watch_mode, config.poll_interval),
            tailers: Arc::new(Mutex::new(HashMap::new())),
            drains: Mutex::new(JoinSet::new()),
        }
    }

    /// Tailers build their watchers with `watchers` instead of from the
    /// configured watch mode.
    pub fn with_watcher_factory(mut self, watchers: WatcherFactory) -> Self {
        self.watchers = watchers;
        self
    }

    /// Start tailing `path` unless the file is already tailed.
    ///
    /// `pod` is `<shortened process guid>-<suffix>`, `container` decides the
    /// source type. With `tail` set only content appended from now on is
    /// read. Must be called from within a tokio runtime.
    pub fn admit(&self, pod: &str, container: &str, path: &Path, tail: bool) -> Result<()> {
        let source_type = SourceCategory::classify(container)
            .source_type()
            .ok_or_else(|| AdmitError::UnsupportedSourceName(container.to_string()))?;

        let (shortened, _suffix) = pod
            .rsplit_once('-')
            .ok_or_else(|| AdmitError::InvalidPodName(pod.to_string()))?;

        let guid = ProcessGuid::decode(shortened).map_err(|source| {
            AdmitError::InvalidProcessGuid {
                pod: pod.to_string(),
                source,
            }
        })?;

        let open_err = |source| AdmitError::Open {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(open_err)?;
        let file_id = self
            .identity
            .identify(&file)
            .map_err(|source| AdmitError::InvalidInode {
                path: path.to_path_buf(),
                source,
            })?;

        let handle = TailerHandle {
            path: path.to_path_buf(),
            pod: pod.to_string(),
            app_id: guid.app_id(),
            source_type,
        };

        // Fixed now, so appends racing the tailer thread's start are read
        let start = StartAt::from_tail(tail).pin(&mut file).map_err(open_err)?;

        {
            let mut tailers = lock(&self.tailers);
            if tailers.contains_key(&file_id) {
                debug!(path = ?path, pod, file_id = %file_id, "File already tailed");
                return Ok(());
            }
            tailers.insert(file_id, handle.clone());
        }

        info!(
            path = ?path,
            pod,
            app_id = %handle.app_id,
            source_type = %source_type,
            file_id = %file_id,
            tail,
            offset = start,
            "Tailing log file"
        );

        let stream = Tailer::new(path, handle.app_id.clone(), source_type, self.config)
            .with_identity_provider(self.identity.clone())
            .with_watcher_factory(self.watchers.clone())
            .spawn_with_file(file, file_id, StartAt::At(start));

        let sink = self.sink.clone();
        let tailers = self.tailers.clone();
        let mut drains = lock(&self.drains);
        // Reap drains that already finished
        while drains.try_join_next().is_some() {}
        drains.spawn(drain(sink, tailers, file_id, handle, stream));

        Ok(())
    }

    pub fn len(&self) -> usize {
        lock(&self.tailers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.tailers).is_empty()
    }

    pub fn contains(&self, file_id: &FileId) -> bool {
        lock(&self.tailers).contains_key(file_id)
    }

    /// Snapshot of the files currently tailed.
    pub fn tracked(&self) -> Vec<(FileId, TailerHandle)> {
        let mut tracked: Vec<_> = lock(&self.tailers)
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();
        tracked.sort_by_key(|(id, _)| *id);
        tracked
    }

    /// Wait for drain tasks to finish, at most `timeout`. Tailers are not
    /// stopped; drains still running after the timeout are left detached.
    /// Returns true when every drain finished.
    pub async fn wait_for_drains(&self, timeout: Duration) -> bool {
        let mut drains = std::mem::take(&mut *lock(&self.drains));
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, drains.join_next()).await {
                Ok(Some(Err(e))) => error!(error = %e, "Drain task failed"),
                Ok(Some(Ok(()))) => {}
                Ok(None) => return true,
                Err(_) => {
                    warn!(
                        remaining = drains.len(),
                        "Timed out waiting for tailers to finish"
                    );
                    drains.detach_all();
                    return false;
                }
            }
        }
    }
}

async fn drain(
    sink: Arc<dyn EventSink>,
    tailers: Arc<Mutex<TailerMap>>,
    file_id: FileId,
    handle: TailerHandle,
    mut stream: EntryStream,
) {
    let mut failed = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(entry) => {
                if let Err(e) = sink.emit(entry).await {
                    warn!(
                        path = ?handle.path,
                        app_id = %handle.app_id,
                        sink = sink.name(),
                        error = %e,
                        "Failed to emit log entry"
                    );
                }
            }
            Err(e) => {
                failed = true;
                error!(
                    path = ?handle.path,
                    pod = %handle.pod,
                    app_id = %handle.app_id,
                    error = %e,
                    "Tailer failed"
                );
            }
        }
    }

    if !failed {
        info!(path = ?handle.path, app_id = %handle.app_id, "Tailer closed");
    }

    lock(&tailers).remove(&file_id);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
