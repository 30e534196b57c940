//! On-disk storage backend.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{AccessHandle, StorageBackend};

/// Storage rooted at a directory on disk.
///
/// The directory is created on first acquisition. Exclusivity comes from an
/// advisory lock on the opened file, so a second handle to the same file
/// (from this process or another) fails until the first is dropped.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageBackend for FsStorage {
    type Handle = FsAccessHandle;

    fn root(&self) -> &Path {
        &self.root
    }

    fn open_exclusive(&self, name: &str) -> impl Future<Output = io::Result<FsAccessHandle>> + Send {
        let root = self.root.clone();
        let path = self.root.join(name);
        async move {
            tokio::task::spawn_blocking(move || open_locked(&root, path))
                .await
                .map_err(io::Error::other)?
        }
    }
}

fn open_locked(root: &Path, path: PathBuf) -> io::Result<FsAccessHandle> {
    fs::create_dir_all(root)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;

    match file.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "file is locked by another handle",
            ));
        }
        Err(TryLockError::Error(e)) => return Err(e),
    }

    tracing::debug!("Locked {}", path.display());
    Ok(FsAccessHandle { file, path })
}

/// Exclusive handle to a file on disk. The lock is released on drop.
#[derive(Debug)]
pub struct FsAccessHandle {
    file: File,
    path: PathBuf,
}

impl FsAccessHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccessHandle for FsAccessHandle {
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write(buf)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_root_and_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("origins").join("local");
        let storage = FsStorage::new(&root);

        let handle = storage.open_exclusive("PatientData.txt").await.unwrap();

        assert!(root.join("PatientData.txt").exists());
        assert_eq!(handle.path(), root.join("PatientData.txt"));
        assert_eq!(handle.size().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_handle_is_refused_while_held() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        let first = storage.open_exclusive("doc.txt").await.unwrap();
        let err = storage.open_exclusive("doc.txt").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(first);
        assert!(storage.open_exclusive("doc.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_write_truncate_read() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let mut handle = storage.open_exclusive("doc.txt").await.unwrap();

        handle.write_all_at(b"hello world", 0).unwrap();
        handle.truncate(5).unwrap();
        handle.flush().unwrap();

        let mut buf = vec![0u8; 16];
        let read = handle.read_full_at(&mut buf, 0).unwrap();
        assert_eq!(&buf[..read], b"hello");
        assert_eq!(fs::read(dir.path().join("doc.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_existing_content_is_kept_on_open() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("doc.txt"), b"{\"a\":1}").unwrap();
        let storage = FsStorage::new(dir.path());

        let handle = storage.open_exclusive("doc.txt").await.unwrap();
        assert_eq!(handle.size().unwrap(), 7);
    }
}
