use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::PersistenceError;

/// Replaces the contents of a document on disk, one write at a time.
///
/// Every write lands in a temporary file next to the target and is renamed
/// over it. Starting a write supersedes the previous one: a superseded write
/// that has not been renamed yet is discarded, so the file always ends up
/// holding the most recently requested contents.
#[derive(Debug, Default)]
pub struct DocumentWriter {
    generation: Arc<AtomicU64>,
    lock: Arc<Mutex<()>>,
    pending: Option<JoinHandle<Result<(), PersistenceError>>>,
}

fn write_atomically(
    lock: &Mutex<()>,
    generation: &AtomicU64,
    expected: u64,
    path: &Path,
    contents: &str,
) -> Result<(), PersistenceError> {
    let io_error = |source: io::Error| PersistenceError::Io {
        path: path.to_owned(),
        source,
    };

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_error)?;

    let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(contents.as_bytes()).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;

    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    if generation.load(Ordering::SeqCst) != expected {
        return Err(PersistenceError::Cancelled);
    }
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

impl DocumentWriter {
    pub fn new() -> DocumentWriter {
        DocumentWriter::default()
    }

    /// Supersedes whatever write is in flight.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.take() {
            debug!("Cancelling pending monitors config write");
            handle.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Writes `contents` to `path` and returns once it is on disk.
    pub fn write_sync(&mut self, path: &Path, contents: &str) -> Result<(), PersistenceError> {
        self.cancel();
        let expected = self.generation.load(Ordering::SeqCst);
        write_atomically(&self.lock, &self.generation, expected, path, contents)
    }

    /// Starts writing `contents` to `path` on the blocking pool of the
    /// current tokio runtime. Without a runtime the write happens inline.
    /// Failures of a background write are logged, not returned.
    pub fn write(&mut self, path: PathBuf, contents: String) -> Result<(), PersistenceError> {
        self.cancel();
        let expected = self.generation.load(Ordering::SeqCst);

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime, writing '{}' synchronously", path.display());
                return write_atomically(&self.lock, &self.generation, expected, &path, &contents);
            }
        };

        let lock = Arc::clone(&self.lock);
        let generation = Arc::clone(&self.generation);
        self.pending = Some(handle.spawn_blocking(move || {
            let result = write_atomically(&lock, &generation, expected, &path, &contents);
            match &result {
                Ok(()) => debug!("Wrote monitors config to '{}'", path.display()),
                Err(PersistenceError::Cancelled) => {
                    debug!("Write of '{}' was superseded", path.display())
                }
                Err(err) => warn!("Saving monitor configuration failed: {}", err),
            }
            result
        }));
        Ok(())
    }

    /// Waits for the background write started last, if any.
    pub async fn flush(&mut self) -> Result<(), PersistenceError> {
        match self.pending.take() {
            Some(handle) => handle.await.unwrap_or(Err(PersistenceError::Cancelled)),
            None => Ok(()),
        }
    }
}
