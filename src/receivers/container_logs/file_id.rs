// SPDX-License-Identifier: Apache-2.0

//! Rename-independent file identity.
//!
//! On Unix systems this is the device ID + inode number of the opened file.
//! Platforms without inode semantics plug in their own [`FileIdentityProvider`].

use std::fs::{File, Metadata};
use std::io;
use std::path::Path;

/// A unique identifier for a physical file.
///
/// Stays stable across renames, making it the deduplication key for tailers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Identity from file metadata, `None` where the platform has no inodes.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

/// Resolves open files and paths to their [`FileId`].
pub trait FileIdentityProvider: Send + Sync {
    /// Identity of an already opened file.
    fn identify(&self, file: &File) -> io::Result<FileId>;

    /// Identity of whatever file `path` currently names.
    fn identify_path(&self, path: &Path) -> io::Result<FileId> {
        let file = File::open(path)?;
        self.identify(&file)
    }
}

/// Device + inode identity read from file metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct InodeIdentity;

impl FileIdentityProvider for InodeIdentity {
    fn identify(&self, file: &File) -> io::Result<FileId> {
        let metadata = file.metadata()?;
        match FileId::from_metadata(&metadata) {
            // Inode 0 is never handed out for a real file.
            Some(id) if id.ino() != 0 => Ok(id),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file reports inode 0",
            )),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no inode identity on this platform",
            )),
        }
    }

    fn identify_path(&self, path: &Path) -> io::Result<FileId> {
        // Stat instead of open: cheaper, and follows symlinks the same way.
        let metadata = std::fs::metadata(path)?;
        FileId::from_metadata(&metadata).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                "no inode identity on this platform",
            )
        })
    }
}
