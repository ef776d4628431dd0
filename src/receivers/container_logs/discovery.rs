// SPDX-License-Identifier: Apache-2.0

//! Discovery of container log files in the runtime's log directory.
//!
//! Files are named `pod_namespace_container.log`. The pod and namespace
//! never contain `_`, the container name may. Existing files are reported
//! first, then every file created afterwards. Anything else in the directory
//! is ignored.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::receivers::container_logs::error::DiscoveryError;
use crate::receivers::container_logs::watcher::{
    FileEventKind, FileWatcher, WatchMode, WatcherFactory, watcher_factory,
};

pub const LOG_SUFFIX: &str = ".log";

const DISCOVERY_QUEUE_SIZE: usize = 16;

/// A recognized log file.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    pub pod: String,
    pub namespace: String,
    pub container: String,
    pub path: PathBuf,
    /// Set for files that already existed when watching started
    pub info: Option<Metadata>,
}

impl DiscoveryEvent {
    pub fn existed_at_start(&self) -> bool {
        self.info.is_some()
    }
}

/// Parse a log file path into a discovery event.
pub fn to_event(path: &Path) -> Option<DiscoveryEvent> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(LOG_SUFFIX)?;

    let mut fields = stem.splitn(3, '_');
    let pod = fields.next().filter(|s| !s.is_empty())?;
    let namespace = fields.next().filter(|s| !s.is_empty())?;
    let container = fields.next().filter(|s| !s.is_empty())?;

    Some(DiscoveryEvent {
        pod: pod.to_string(),
        namespace: namespace.to_string(),
        container: container.to_string(),
        path: path.to_path_buf(),
        info: None,
    })
}

/// Start watching `dir`.
///
/// The watch is registered and the files already present are listed before
/// this returns, so a registration failure is reported directly and only
/// files present at that point carry metadata. The returned sequence closes
/// when the notification channel fails or the receiver is dropped; it is
/// never restarted.
pub fn watch(
    dir: &Path,
    mode: WatchMode,
    poll_interval: Duration,
) -> Result<BoundedReceiver<DiscoveryEvent>, DiscoveryError> {
    watch_with(dir, &watcher_factory(mode, poll_interval), poll_interval)
}

/// [`watch`] with a caller supplied watcher.
pub fn watch_with(
    dir: &Path,
    watchers: &WatcherFactory,
    wait_interval: Duration,
) -> Result<BoundedReceiver<DiscoveryEvent>, DiscoveryError> {
    let start_err = |source| DiscoveryError::Start {
        path: dir.to_path_buf(),
        source,
    };
    let mut watcher = watchers().map_err(start_err)?;
    watcher.watch(dir).map_err(start_err)?;

    info!(
        log_dir = ?dir,
        backend = watcher.backend_name(),
        native = watcher.is_native(),
        "Watching log directory"
    );

    let existing = current_logs(dir);
    debug!(log_dir = ?dir, count = existing.len(), "Listed current logs");

    let (tx, rx) = bounded(DISCOVERY_QUEUE_SIZE);
    let dir = dir.to_path_buf();
    std::thread::Builder::new()
        .name("podtail-discovery".to_string())
        .spawn(move || run(dir, existing, watcher, wait_interval, tx))
        .map_err(|e| start_err(e.into()))?;

    Ok(rx)
}

fn run(
    dir: PathBuf,
    existing: Vec<DiscoveryEvent>,
    mut watcher: Box<dyn FileWatcher>,
    wait_interval: Duration,
    tx: BoundedSender<DiscoveryEvent>,
) {
    for evt in existing {
        if tx.send_blocking(evt).is_err() {
            return;
        }
    }

    loop {
        let events = match watcher.recv_timeout(wait_interval) {
            Ok(events) => events,
            Err(e) => {
                error!(log_dir = ?dir, error = %e, "Directory watcher failed");
                return;
            }
        };

        for event in events {
            if event.kind != FileEventKind::Create {
                continue;
            }
            for path in event.paths {
                if let Some(evt) = to_event(&path) {
                    debug!(path = ?evt.path, "Discovered new log file");
                    if tx.send_blocking(evt).is_err() {
                        return;
                    }
                }
            }
        }

        if tx.is_closed() {
            debug!(log_dir = ?dir, "Discovery consumer gone, stopping");
            return;
        }
    }
}

/// Log files already in `dir`, each with its metadata. Listing errors are
/// logged and end the listing early.
fn current_logs(dir: &Path) -> Vec<DiscoveryEvent> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(log_dir = ?dir, error = %e, "Failed to list current logs");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!(log_dir = ?dir, error = %e, "Failed to read directory entry");
                break;
            }
        };
        let Ok(info) = entry.metadata() else {
            continue;
        };
        if info.is_dir() {
            continue;
        }

        if let Some(mut evt) = to_event(&entry.path()) {
            evt.info = Some(info);
            found.push(evt);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;
    use crate::receivers::container_logs::watcher::testing::closed_channel_watchers;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut BoundedReceiver<DiscoveryEvent>) -> DiscoveryEvent {
        timeout(WAIT, rx.next())
            .await
            .expect("timed out waiting for discovery event")
            .expect("discovery stream closed")
    }

    fn assert_fields(event: &DiscoveryEvent, pod: &str, ns: &str, container: &str, path: &Path) {
        assert_eq!(event.pod, pod);
        assert_eq!(event.namespace, ns);
        assert_eq!(event.container, container);
        assert_eq!(event.path, path);
    }

    #[test]
    fn test_to_event() {
        let event = to_event(Path::new("/logs/pod_ns_cnr.log")).unwrap();
        assert_fields(&event, "pod", "ns", "cnr", Path::new("/logs/pod_ns_cnr.log"));
        assert!(event.info.is_none());

        assert!(to_event(Path::new("/logs/plain.log")).is_none());
        assert!(to_event(Path::new("/logs/x.txt")).is_none());
        assert!(to_event(Path::new("/logs/pod_ns_cnr.log.1")).is_none());
    }

    #[test]
    fn test_to_event_container_keeps_underscores() {
        let event = to_event(Path::new("web-abc_default_staging-build_step_2.log")).unwrap();
        assert_eq!(event.pod, "web-abc");
        assert_eq!(event.namespace, "default");
        assert_eq!(event.container, "staging-build_step_2");
    }

    #[test]
    fn test_to_event_rejects_empty_fields() {
        assert!(to_event(Path::new("_ns_cnr.log")).is_none());
        assert!(to_event(Path::new("pod__cnr.log")).is_none());
        assert!(to_event(Path::new("pod_ns_.log")).is_none());
        assert!(to_event(Path::new("pod_ns.log")).is_none());
    }

    #[tokio::test]
    async fn test_existing_file_fires_with_info() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("existing_namespace_cnr.log");
        File::create(&existing).unwrap();
        std::fs::create_dir(dir.path().join("dir_namespace_cnr.log")).unwrap();

        let mut rx = watch(dir.path(), WatchMode::Poll, Duration::from_millis(10)).unwrap();

        let event = next_event(&mut rx).await;
        assert_fields(&event, "existing", "namespace", "cnr", &existing);
        assert!(event.existed_at_start());
        assert!(timeout(Duration::from_millis(200), rx.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_created_file_fires_without_info() {
        let dir = TempDir::new().unwrap();
        let mut rx = watch(dir.path(), WatchMode::Native, Duration::from_millis(10)).unwrap();

        let created = dir.path().join("pod_namespace_cnr.log");
        File::create(&created).unwrap();

        let event = next_event(&mut rx).await;
        assert_fields(&event, "pod", "namespace", "cnr", &created);
        assert!(!event.existed_at_start());
    }

    #[tokio::test]
    async fn test_generic_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut rx = watch(dir.path(), WatchMode::Poll, Duration::from_millis(10)).unwrap();

        File::create(dir.path().join("some.log")).unwrap();

        assert!(timeout(Duration::from_millis(300), rx.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_rotation_fires_for_new_file() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("existing_namespace_cnr.log");
        File::create(&existing).unwrap();

        let mut rx = watch(dir.path(), WatchMode::Poll, Duration::from_millis(10)).unwrap();
        let first = next_event(&mut rx).await;
        let first_info = first.info.unwrap();

        std::fs::rename(&existing, dir.path().join("existing_namespace_cnr.log.1")).unwrap();
        File::create(&existing).unwrap();

        let event = next_event(&mut rx).await;
        assert_fields(&event, "existing", "namespace", "cnr", &existing);
        assert!(event.info.is_none());

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let current = std::fs::metadata(&event.path).unwrap();
            assert_ne!(current.ino(), first_info.ino());
        }
        #[cfg(not(unix))]
        let _ = first_info;
    }

    #[test]
    fn test_missing_directory_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let Err(err) = watch(&missing, WatchMode::Poll, Duration::from_millis(10)) else {
            panic!("watching a missing directory succeeded");
        };
        assert!(matches!(err, DiscoveryError::Start { path, .. } if path == missing));
    }

    #[tokio::test]
    async fn test_existing_files_are_listed_before_watch_returns() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("existing_namespace_cnr.log");
        File::create(&existing).unwrap();

        let mut rx = watch(dir.path(), WatchMode::Poll, Duration::from_millis(10)).unwrap();
        File::create(dir.path().join("late_namespace_cnr.log")).unwrap();

        let first = next_event(&mut rx).await;
        assert_eq!(first.path, existing);
        assert!(first.existed_at_start());

        let late = next_event(&mut rx).await;
        assert_eq!(late.pod, "late");
        assert!(!late.existed_at_start());
    }

    #[tokio::test]
    async fn test_failed_notification_channel_closes_stream() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("existing_namespace_cnr.log")).unwrap();

        let mut rx = watch_with(
            dir.path(),
            &closed_channel_watchers(),
            Duration::from_millis(10),
        )
        .unwrap();

        assert!(next_event(&mut rx).await.existed_at_start());
        assert!(timeout(WAIT, rx.next()).await.unwrap().is_none());
    }
}
