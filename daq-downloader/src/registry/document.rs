//! Atomically replaced JSON documents
//!
//! Readers open the document path directly and never take a lock: a write
//! goes to a temporary file in the same directory, is flushed and synced,
//! then renamed over the previous document. Writers serialize through an
//! advisory `flock` on a `.lock` sidecar so separate processes sharing the
//! data directory cannot interleave read-modify-write cycles.
//!
//! All functions here block; async callers run them on the blocking pool.

use daq_common::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// One JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last durably written content, or the default if never written
    pub fn read(&self) -> Result<T> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the document wholesale
    pub fn replace(&self, value: &T) -> Result<()> {
        let _guard = self.lock()?;
        self.write_atomic(value)
    }

    /// Read-modify-write under the writer lock
    ///
    /// The document is rewritten only when `apply` returns `Ok`; an error
    /// leaves the file untouched.
    pub fn update<R, F>(&self, apply: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let _guard = self.lock()?;
        let mut value = self.read()?;
        let result = apply(&mut value)?;
        self.write_atomic(&value)?;
        Ok(result)
    }

    /// Like [`update`](Self::update), but skips the write when `apply`
    /// reports no change. Returns the resulting content and the flag.
    pub fn update_if<F>(&self, apply: F) -> Result<(T, bool)>
    where
        F: FnOnce(&mut T) -> Result<bool>,
    {
        let _guard = self.lock()?;
        let mut value = self.read()?;
        let changed = apply(&mut value)?;
        if changed {
            self.write_atomic(&value)?;
        }
        Ok((value, changed))
    }

    fn lock(&self) -> Result<WriterLock> {
        let dir = self.parent_dir()?;
        std::fs::create_dir_all(dir)?;

        let lock_path = lock_path_for(&self.path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| Error::Lock(format!("{}: {}", lock_path.display(), e)))?;
        Ok(WriterLock { file })
    }

    fn write_atomic(&self, value: &T) -> Result<()> {
        let dir = self.parent_dir()?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %self.path.display(), "Document replaced");
        Ok(())
    }

    fn parent_dir(&self) -> Result<&Path> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Internal(format!("Document path has no directory: {}", self.path.display())))
    }
}

/// `runs.json` → `runs.json.lock`
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Releases the advisory lock on drop
struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(error = %e, "Failed to release document lock");
        }
    }
}
