//! Object storage abstraction and backends for the chart repository.
//!
//! This crate provides:
//! - The [`StorageBackend`] trait: list/get/put/delete over `/`-separated keys
//! - [`StorageObject`] listing snapshots with size and modification time
//! - Backends: local filesystem and in-memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::LocalFilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{join_key, validate_key, StorageBackend, StorageObject};
