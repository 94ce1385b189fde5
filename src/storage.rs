//! Durable key/value blob storage.
//!
//! The store persists as named string blobs through [`StorageBackend`], so the
//! same core runs against a directory on disk ([`FileBackend`]) or entirely in
//! memory ([`MemoryBackend`]) for tests and ephemeral sessions.

use crate::error::{Result, StoreError};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable read/write capability for named string blobs.
pub trait StorageBackend: Send + Sync {
    /// Read a blob. `Ok(None)` if the key has never been written.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Durably write a blob. Must be complete on disk when this returns.
    fn store(&self, key: &str, blob: &str) -> Result<()>;
}

/// One file per key under a base directory.
///
/// Holds an exclusive advisory lock for the lifetime of the backend, so two
/// processes never write the same store. Writes go through a temp file and
/// rename, keeping the previous blob intact if the write is interrupted.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    _lock_file: File,
}

impl FileBackend {
    /// Open a backend rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_file = File::create(dir.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(Self {
            dir,
            _lock_file: lock_file,
        })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.blob_path(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, blob: &str) -> Result<()> {
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(blob.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.blob_path(key))?;
        Ok(())
    }
}

/// In-memory backend. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn store(&self, key: &str, blob: &str) -> Result<()> {
        self.blobs.write().insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
