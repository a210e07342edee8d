//! # Repository Index
//!
//! Builds Helm `index.yaml` documents from storage listings and caches them
//! per repository.
//!
//! - [`chart`]: chart version metadata and the [`ChartExtractor`] seam
//! - [`builder`]: deterministic index construction
//! - [`cache`]: the coalescing [`IndexCache`]
//! - [`registry`]: one cache per repository path

pub mod builder;
pub mod cache;
pub mod chart;
pub mod registry;

pub use builder::{storage_prefix, IndexBuilder, ObjectSnapshot, RepositoryIndex};
pub use cache::{IndexCache, RegenerationResult};
pub use chart::{ChartExtractor, ChartMetadata, ChartVersion, FilenameExtractor};
pub use registry::IndexRegistry;

/// Failures of an index regeneration wave.
///
/// Cloneable so one result can be delivered to every waiter of a wave.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("failed to list storage objects: {0}")]
    StorageList(String),

    #[error("failed to build repository index: {0}")]
    StorageBuild(String),

    #[error("no repository index available: {0}")]
    NoIndexAvailable(String),

    #[error("index regeneration was interrupted before completing")]
    Interrupted,
}
