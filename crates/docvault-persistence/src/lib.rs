//! Single-document persistence worker.
//!
//! A worker receives `save` and `load` messages over an async channel and
//! keeps exactly one JSON document in one private, origin-scoped file.
//!
//! # Features
//!
//! - **Lazy acquisition**: the file handle is opened on the first request,
//!   once, no matter how many requests race for it
//! - **Whole-document replace**: every save truncates before writing, so a
//!   shorter document never leaves stale trailing bytes
//! - **Typed failures**: every error is answered with an error response and
//!   the worker keeps running
//!
//! # File Format
//!
//! The file holds the UTF-8 JSON serialization of the last save envelope,
//! `type` field included. There is no header or version marker.
//!
//! # Example
//!
//! ```ignore
//! use docvault_persistence::{DocumentStore, MemoryStorage, Response, spawn_worker};
//! use serde_json::json;
//!
//! let store = DocumentStore::with_default_name(MemoryStorage::new());
//! let mut worker = spawn_worker(store, 16);
//!
//! worker.post(json!({"type": "save", "name": "Ada"})).await?;
//! let Response::Loaded(text) = worker.load().await? else { unreachable!() };
//! assert_eq!(text, r#"{"name":"Ada","type":"save"}"#);
//! ```
//!
//! # Architecture
//!
//! - `storage/` - backends handing out exclusive file handles (disk, memory)
//! - `store.rs` - lazily initialized document store
//! - `worker.rs` - channel-driven worker task and its handle
//! - `protocol.rs` - request and response messages
//! - `config.rs` - settings file and origin-scoped paths
//! - `error.rs` - error types with user-friendly messages

mod config;
mod error;
mod protocol;
mod storage;
mod store;
mod worker;

pub use config::{StoreConfig, sanitize_origin};
pub use error::{ErrorKind, PersistenceError, Result};
pub use protocol::{ErrorResponse, LOAD, Request, Response, SAVE, message_type};
pub use storage::{
    AccessHandle, FsAccessHandle, FsStorage, MemoryAccessHandle, MemoryStorage, StorageBackend,
};
pub use store::{DEFAULT_FILE_NAME, DocumentStore, StoreState};
pub use worker::{DEFAULT_CHANNEL_CAPACITY, WorkerHandle, spawn_worker};
