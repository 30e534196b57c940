//! The single-document store.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::{PersistenceError, Result};
use crate::storage::{AccessHandle, StorageBackend};

/// Default name of the document file inside the storage root.
pub const DEFAULT_FILE_NAME: &str = "PatientData.txt";

/// Lifecycle of a [`DocumentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No handle has been acquired yet.
    Uninitialized,
    /// The handle is held for the rest of the store's lifetime.
    Ready,
}

/// One JSON document persisted in one exclusively held file.
///
/// The file handle is acquired lazily by the first operation. Concurrent
/// first callers all await the same acquisition. A failed acquisition leaves
/// the store uninitialized, so the next operation tries again.
///
/// Every save replaces the whole file: it truncates, writes from offset 0,
/// then flushes. A crash between truncate and flush can leave the file empty
/// or partially written.
pub struct DocumentStore<S: StorageBackend> {
    storage: S,
    file_name: String,
    handle: OnceCell<Mutex<S::Handle>>,
}

impl<S: StorageBackend> DocumentStore<S> {
    pub fn new(storage: S, file_name: impl Into<String>) -> Self {
        Self {
            storage,
            file_name: file_name.into(),
            handle: OnceCell::new(),
        }
    }

    /// Store using [`DEFAULT_FILE_NAME`].
    pub fn with_default_name(storage: S) -> Self {
        Self::new(storage, DEFAULT_FILE_NAME)
    }

    /// Full path (or namespaced name) of the document.
    pub fn document_path(&self) -> PathBuf {
        self.storage.root().join(&self.file_name)
    }

    pub fn state(&self) -> StoreState {
        if self.handle.initialized() {
            StoreState::Ready
        } else {
            StoreState::Uninitialized
        }
    }

    /// Acquire the file handle if that has not happened yet.
    pub async fn ready(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    /// Replace the stored document with the JSON serialization of `document`.
    ///
    /// Returns the number of bytes written.
    pub async fn save<T: Serialize + ?Sized>(&self, document: &T) -> Result<usize> {
        let handle = self.handle().await?;
        let bytes = serde_json::to_vec(document)
            .map_err(|source| PersistenceError::Serialization { source })?;

        let mut handle = lock(handle);
        self.replace_contents(&mut *handle, &bytes)?;

        tracing::debug!(bytes = bytes.len(), "Saved document");
        Ok(bytes.len())
    }

    /// Read the whole stored document as text.
    ///
    /// Returns an empty string if nothing was ever saved. Invalid UTF-8 is
    /// replaced with U+FFFD rather than rejected.
    pub async fn load(&self) -> Result<String> {
        let handle = self.handle().await?;
        let mut handle = lock(handle);

        let size = handle.size().map_err(|e| self.read_error("size", e))?;
        let len = usize::try_from(size).map_err(|_| {
            self.read_error(
                "size",
                std::io::Error::new(std::io::ErrorKind::InvalidData, "document too large"),
            )
        })?;

        let mut buffer = vec![0u8; len];
        let read = handle
            .read_full_at(&mut buffer, 0)
            .map_err(|e| self.read_error("read", e))?;
        buffer.truncate(read);

        tracing::debug!(bytes = read, "Loaded document");
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    async fn handle(&self) -> Result<&Mutex<S::Handle>> {
        self.handle
            .get_or_try_init(|| async {
                let path = self.document_path();
                tracing::debug!("Acquiring {}", path.display());
                let handle = self
                    .storage
                    .open_exclusive(&self.file_name)
                    .await
                    .map_err(|source| PersistenceError::StorageUnavailable {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!("Acquired document handle for {}", path.display());
                Ok::<_, PersistenceError>(Mutex::new(handle))
            })
            .await
    }

    fn replace_contents(&self, handle: &mut S::Handle, bytes: &[u8]) -> Result<()> {
        handle
            .truncate(0)
            .map_err(|e| self.write_error("truncate", e))?;
        handle
            .write_all_at(bytes, 0)
            .map_err(|e| self.write_error("write", e))?;
        handle.flush().map_err(|e| self.write_error("flush", e))
    }

    fn write_error(&self, operation: &'static str, source: std::io::Error) -> PersistenceError {
        PersistenceError::WriteFailure {
            operation,
            path: self.document_path(),
            source,
        }
    }

    fn read_error(&self, operation: &'static str, source: std::io::Error) -> PersistenceError {
        PersistenceError::ReadFailure {
            operation,
            path: self.document_path(),
            source,
        }
    }
}

// Handle operations never leave the file half-updated in memory, so a
// poisoned lock is still usable.
fn lock<H>(handle: &Mutex<H>) -> MutexGuard<'_, H> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
