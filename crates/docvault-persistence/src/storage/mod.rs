//! Storage backends.
//!
//! A backend resolves a private storage root and hands out exclusive,
//! synchronous access handles to named files inside it. Acquiring a handle
//! is async; every operation on an acquired handle is synchronous.
//!
//! - `fs` - files on disk, exclusivity through an OS file lock
//! - `memory` - process-local buffers for ephemeral stores

mod fs;
mod memory;

pub use fs::{FsAccessHandle, FsStorage};
pub use memory::{MemoryAccessHandle, MemoryStorage};

use std::future::Future;
use std::io;
use std::path::Path;

/// Exclusive synchronous access to one file.
pub trait AccessHandle: Send + 'static {
    /// Current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Read into `buf` starting at `offset`, returning the bytes read.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write `buf` starting at `offset`, returning the bytes written.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Resize the file to exactly `size` bytes.
    fn truncate(&mut self, size: u64) -> io::Result<()>;

    /// Persist buffered writes.
    fn flush(&mut self) -> io::Result<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_all_at(&mut self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fill as much of `buf` as the file allows, starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short only at end of file.
    fn read_full_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// A private storage root that can open files for exclusive access.
pub trait StorageBackend: Send + Sync + 'static {
    type Handle: AccessHandle;

    /// Directory (or namespace) the files live in.
    fn root(&self) -> &Path;

    /// Open `name`, creating it if absent, and acquire exclusive access.
    ///
    /// Fails if another handle to the same file is still held.
    fn open_exclusive(&self, name: &str) -> impl Future<Output = io::Result<Self::Handle>> + Send;
}
