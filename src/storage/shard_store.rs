use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AgentError, Result};

pub const SHARD_FILE_EXTENSION: &str = "dat";

/// Append-only shard files under one directory, scoped by the owning port.
///
/// Shard `name` owned by the agent on `port` lives at `{dir}/{name}-{port}.dat`,
/// so several agents can share a directory. Appends to the same shard are
/// serialized by a per-name lock held for the whole write; different shards
/// never contend.
#[derive(Debug)]
pub struct ShardStore {
    dir: PathBuf,
    port: u16,
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ShardStore {
    pub fn new(dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            dir: dir.into(),
            port,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// File backing shard `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self
            .dir
            .join(format!("{name}-{}.{SHARD_FILE_EXTENSION}", self.port)))
    }

    /// Append `data` to shard `name`, creating it if absent.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<u64> {
        let mut reader = data;
        self.write_from(name, &mut reader).await
    }

    /// Append everything `reader` yields until EOF to shard `name`.
    pub async fn write_from<R>(&self, name: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.path_for(name)?;
        let _lock = self.lock_name(name).await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!(shard = name, bytes = written, "Shard appended");
        Ok(written)
    }

    /// Read shard `name` from `offset` to its current end.
    pub async fn read(&self, name: &str, offset: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to(name, offset, &mut buf).await?;
        Ok(buf)
    }

    /// Stream shard `name` from `offset` into `writer`.
    ///
    /// An offset at or past the end yields zero bytes.
    pub async fn read_to<W>(&self, name: &str, offset: u64, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.path_for(name)?;
        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AgentError::ShardNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if offset >= len {
            return Ok(0);
        }
        file.seek(SeekFrom::Start(offset)).await?;
        let sent = tokio::io::copy(&mut file, writer).await?;
        writer.flush().await?;
        Ok(sent)
    }

    /// Current size of shard `name`.
    pub async fn len(&self, name: &str) -> Result<u64> {
        let path = self.path_for(name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AgentError::ShardNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove shard `name`. Returns false if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        let _lock = self.lock_name(name).await;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every shard file in the directory owned by `port`.
    ///
    /// Directories are left alone even if their name matches.
    pub async fn cleanup(&self, port: u16) -> Result<usize> {
        let suffix = format!("-{port}.{SHARD_FILE_EXTENSION}");
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(&suffix) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(file = ?name, error = %e, "Failed to remove stale shard file");
                }
            }
        }

        tracing::info!(dir = %self.dir.display(), port, removed, "Removed stale shard files");
        Ok(removed)
    }

    /// Exclusive access to shard `name` until the returned lock is dropped.
    async fn lock_name<'a>(&'a self, name: &'a str) -> NameLock<'a> {
        let lock = self
            .write_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        NameLock {
            locks: &self.write_locks,
            name,
            guard: Some(guard),
        }
    }

    /// Number of shard names with a lock entry.
    pub fn tracked_locks(&self) -> usize {
        self.write_locks.lock().len()
    }
}

/// Held per-name lock. On drop the map entry is evicted unless another
/// writer holds a clone of it or is queued on it.
struct NameLock<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    name: &'a str,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for NameLock<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // Clones are only taken under the map lock, so the count is stable here.
        let mut locks = self.locks.lock();
        let lock = tokio::sync::OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(self.name);
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(AgentError::InvalidShardName(name.to_string()));
    }
    Ok(())
}
