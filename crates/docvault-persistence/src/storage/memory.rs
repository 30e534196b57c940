//! In-memory storage backend.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AccessHandle, StorageBackend};

/// Process-local storage. Clones share the same files.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    root: PathBuf,
    files: Arc<Mutex<HashMap<String, Arc<MemoryFile>>>>,
}

#[derive(Debug, Default)]
struct MemoryFile {
    data: Mutex<Vec<u8>>,
    held: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("memory"),
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot of a file's bytes, if it was ever created.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let files = self.files.lock().ok()?;
        let data = files.get(name)?.data.lock().ok()?;
        Some(data.clone())
    }
}

impl StorageBackend for MemoryStorage {
    type Handle = MemoryAccessHandle;

    fn root(&self) -> &Path {
        &self.root
    }

    fn open_exclusive(&self, name: &str) -> impl Future<Output = io::Result<MemoryAccessHandle>> + Send {
        let result = self.acquire(name);
        async move { result }
    }
}

impl MemoryStorage {
    fn acquire(&self, name: &str) -> io::Result<MemoryAccessHandle> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))?;
        let file = Arc::clone(files.entry(name.to_string()).or_default());

        if file.held.swap(true, Ordering::AcqRel) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "file is locked by another handle",
            ));
        }
        Ok(MemoryAccessHandle { file })
    }
}

/// Exclusive handle to an in-memory file. Released on drop.
#[derive(Debug)]
pub struct MemoryAccessHandle {
    file: Arc<MemoryFile>,
}

impl MemoryAccessHandle {
    fn data(&self) -> io::Result<MutexGuard<'_, Vec<u8>>> {
        self.file
            .data
            .lock()
            .map_err(|_| io::Error::other("memory file lock poisoned"))
    }
}

impl Drop for MemoryAccessHandle {
    fn drop(&mut self) {
        self.file.held.store(false, Ordering::Release);
    }
}

impl AccessHandle for MemoryAccessHandle {
    fn size(&self) -> io::Result<u64> {
        Ok(self.data()?.len() as u64)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data()?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut data = self.data()?;
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size out of range"))?;
        self.data()?.resize(size, 0);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
