// SPDX-License-Identifier: Apache-2.0

//! Follows a single container log file and decodes its records.
//!
//! Each tailer runs on its own OS thread: file reads and waiting on change
//! notifications are blocking. Decoded entries are pushed into a bounded
//! queue, so a slow consumer throttles reading. The consumer side is an
//! [`EntryStream`], which ends after the tailer has stopped, with the
//! terminal error as its last item when the tailer failed.
//!
//! Lifecycle: open, then alternate between reading everything currently
//! available and waiting for a change notification. When the path is removed
//! or renamed away (or now names a different file) the tailer reads one last
//! time from its still-open descriptor and closes. Following a new file at
//! the same path is left to directory discovery.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::receivers::container_logs::config::{StartAt, TailerConfig};
use crate::receivers::container_logs::decoder::{DecodeOutcome, IncrementalDecoder};
use crate::receivers::container_logs::entry::{LogEntry, SourceType};
use crate::receivers::container_logs::error::TailerError;
use crate::receivers::container_logs::file_id::{FileId, FileIdentityProvider, InodeIdentity};
use crate::receivers::container_logs::watcher::{FileWatcher, WatcherFactory, watcher_factory};

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub type TailItem = std::result::Result<LogEntry, TailerError>;

/// Entries produced by one tailer, in file order.
pub struct EntryStream {
    rx: BoundedReceiver<TailItem>,
}

impl EntryStream {
    /// Next entry, the terminal error, or `None` once the tailer has stopped.
    pub async fn next(&mut self) -> Option<TailItem> {
        self.rx.next().await
    }
}

pub struct Tailer {
    path: PathBuf,
    app_id: String,
    source_type: SourceType,
    config: TailerConfig,
    identity: Arc<dyn FileIdentityProvider>,
    watchers: WatcherFactory,
}

impl Tailer {
    pub fn new(
        path: impl Into<PathBuf>,
        app_id: impl Into<String>,
        source_type: SourceType,
        config: TailerConfig,
    ) -> Self {
        Self {
            path: path.into(),
            app_id: app_id.into(),
            source_type,
            config,
            identity: Arc::new(InodeIdentity),
            watchers: watcher_factory(config.watch_mode, config.poll_interval),
        }
    }

    pub fn with_identity_provider(mut self, identity: Arc<dyn FileIdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_watcher_factory(mut self, watchers: WatcherFactory) -> Self {
        self.watchers = watchers;
        self
    }

    /// Open `path` and start tailing it.
    pub fn spawn(self, start_at: StartAt) -> EntryStream {
        self.spawn_inner(None, start_at)
    }

    /// Start tailing a file the caller already opened and identified. Pass
    /// [`StartAt::At`] with the offset from [`StartAt::pin`] to start exactly
    /// where the caller looked at the file.
    pub fn spawn_with_file(self, file: File, file_id: FileId, start_at: StartAt) -> EntryStream {
        self.spawn_inner(Some((file, file_id)), start_at)
    }

    fn spawn_inner(self, opened: Option<(File, FileId)>, start_at: StartAt) -> EntryStream {
        let (tx, rx) = bounded::<TailItem>(self.config.queue_size.max(1));
        let failed_tx = tx.clone();
        let path = self.path.clone();

        let spawned = std::thread::Builder::new()
            .name("podtail-tailer".to_string())
            .spawn(move || {
                let path = self.path.clone();
                let err_tx = tx.clone();
                let result = TailRun::open(self, opened, start_at, tx).and_then(TailRun::run);
                match result {
                    Ok(()) => debug!(path = ?path, "Tailer closed"),
                    Err(e) => {
                        debug!(path = ?path, error = %e, "Tailer failed");
                        let _ = err_tx.send_blocking(Err(e));
                    }
                }
            });

        if let Err(e) = spawned {
            error!(path = ?path, error = %e, "Failed to spawn tailer thread");
            let _ = failed_tx.send_blocking(Err(TailerError::Io(e)));
        }

        EntryStream { rx }
    }
}

enum Flow {
    Continue,
    ConsumerGone,
}

enum Change {
    Modified,
    /// The path no longer names the tailed file
    Gone,
    ConsumerGone,
}

/// State owned by a running tailer thread.
struct TailRun {
    path: PathBuf,
    file: File,
    file_id: FileId,
    offset: u64,
    /// Bytes of a started but incomplete record
    carry_over: Vec<u8>,
    /// Reading began inside a record; drop input up to the next newline
    resync: bool,
    watcher: Box<dyn FileWatcher>,
    tx: BoundedSender<TailItem>,
    app_id: String,
    source_type: SourceType,
    identity: Arc<dyn FileIdentityProvider>,
    wait_interval: Duration,
}

impl TailRun {
    fn open(
        tailer: Tailer,
        opened: Option<(File, FileId)>,
        start_at: StartAt,
        tx: BoundedSender<TailItem>,
    ) -> Result<Self, TailerError> {
        let Tailer {
            path,
            app_id,
            source_type,
            config,
            identity,
            watchers,
        } = tailer;

        let (mut file, file_id) = match opened {
            Some(opened) => opened,
            None => {
                let open_err = |source| TailerError::Open {
                    path: path.clone(),
                    source,
                };
                let file = File::open(&path).map_err(open_err)?;
                let file_id = identity.identify(&file).map_err(open_err)?;
                (file, file_id)
            }
        };

        let offset = start_at.pin(&mut file)?;
        let resync = !at_record_boundary(&mut file, offset)?;

        let watch_err = |source| TailerError::Watch {
            path: path.clone(),
            source,
        };
        let mut watcher = watchers().map_err(watch_err)?;
        watcher.watch(&path).map_err(watch_err)?;

        debug!(
            path = ?path,
            file_id = %file_id,
            offset,
            resync,
            backend = watcher.backend_name(),
            "Tailer opened"
        );

        Ok(Self {
            path,
            file,
            file_id,
            offset,
            carry_over: Vec::new(),
            resync,
            watcher,
            tx,
            app_id,
            source_type,
            identity,
            wait_interval: config.poll_interval,
        })
    }

    fn run(mut self) -> Result<(), TailerError> {
        loop {
            if let Flow::ConsumerGone = self.read_available()? {
                return Ok(());
            }
            if self.name_gone() {
                return self.close_after_rotation();
            }
            match self.await_change()? {
                Change::Modified => continue,
                Change::Gone => return self.close_after_rotation(),
                Change::ConsumerGone => return Ok(()),
            }
        }
    }

    /// Decode everything currently readable.
    fn read_available(&mut self) -> Result<Flow, TailerError> {
        self.restart_if_truncated()?;

        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = match self.file.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Ok(Flow::Continue);
            }
            self.offset += n as u64;

            if let Flow::ConsumerGone = self.decode(&chunk[..n])? {
                return Ok(Flow::ConsumerGone);
            }
        }
    }

    fn decode(&mut self, mut bytes: &[u8]) -> Result<Flow, TailerError> {
        if self.resync {
            match bytes.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    debug!(path = ?self.path, skipped = end + 1, "Skipped tail of a partial record");
                    bytes = &bytes[end + 1..];
                    self.resync = false;
                }
                None => return Ok(Flow::Continue),
            }
        }

        let mut decoder = IncrementalDecoder::new(std::mem::take(&mut self.carry_over));
        decoder.feed(bytes);

        loop {
            match decoder.next_record() {
                DecodeOutcome::Value(record) => {
                    let entry = record.into_entry(&self.app_id, self.source_type);
                    if self.tx.send_blocking(Ok(entry)).is_err() {
                        return Ok(Flow::ConsumerGone);
                    }
                }
                DecodeOutcome::NeedMoreData(rest) => {
                    self.carry_over = rest;
                    return Ok(Flow::Continue);
                }
                DecodeOutcome::Malformed(e) => return Err(TailerError::Decode(e)),
            }
        }
    }

    /// A file shorter than our offset was truncated in place.
    fn restart_if_truncated(&mut self) -> io::Result<()> {
        let size = self.file.metadata()?.len();
        if size < self.offset {
            debug!(
                path = ?self.path,
                size,
                offset = self.offset,
                "File truncated, reading from the start"
            );
            self.file.seek(SeekFrom::Start(0))?;
            self.offset = 0;
            self.carry_over.clear();
            self.resync = false;
        }
        Ok(())
    }

    /// The path was unlinked or now names another file. Unlinking an open
    /// file does not produce a delete notification on every platform.
    fn name_gone(&self) -> bool {
        match self.identity.identify_path(&self.path) {
            Ok(id) => id != self.file_id,
            Err(e) => e.kind() == io::ErrorKind::NotFound,
        }
    }

    fn await_change(&mut self) -> Result<Change, TailerError> {
        loop {
            let events = self
                .watcher
                .recv_timeout(self.wait_interval)
                .map_err(TailerError::NotificationChannel)?;

            if events.iter().any(|e| e.kind.is_remove_or_rename()) {
                return Ok(Change::Gone);
            }
            if !events.is_empty() {
                return Ok(Change::Modified);
            }
            if self.tx.is_closed() {
                return Ok(Change::ConsumerGone);
            }
        }
    }

    /// One last read from the open descriptor. A record the writer finished
    /// before this point is still emitted, anything incomplete is dropped.
    fn close_after_rotation(mut self) -> Result<(), TailerError> {
        self.read_available()?;

        let pending = self
            .carry_over
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .count();
        if pending > 0 {
            debug!(
                path = ?self.path,
                bytes = self.carry_over.len(),
                "Dropping incomplete record of rotated file"
            );
        }
        debug!(path = ?self.path, file_id = %self.file_id, "File rotated or removed");
        Ok(())
    }
}

/// Whether `offset` starts a record, i.e. is 0 or follows a newline. Leaves
/// the file positioned at `offset`.
fn at_record_boundary(file: &mut File, offset: u64) -> io::Result<bool> {
    if offset == 0 {
        return Ok(true);
    }
    let mut prev = [0u8; 1];
    file.seek(SeekFrom::Start(offset - 1))?;
    let boundary = match file.read_exact(&mut prev) {
        Ok(()) => prev[0] == b'\n',
        // Truncated meanwhile; reading restarts from 0 anyway
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => true,
        Err(e) => return Err(e),
    };
    file.seek(SeekFrom::Start(offset))?;
    Ok(boundary)
}

impl Drop for TailRun {
    fn drop(&mut self) {
        let _ = self.watcher.unwatch(&self.path);
    }
}
