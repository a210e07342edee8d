//! Chart version metadata and the extractor seam that produces it.

use async_trait::async_trait;
use chart_storage::{StorageBackend, StorageError, StorageObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// File extension of packaged charts.
pub const CHART_PACKAGE_EXTENSION: &str = ".tgz";

/// File extension of provenance files stored beside packages.
pub const PROVENANCE_EXTENSION: &str = ".tgz.prov";

/// One published version of a chart, as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub urls: Vec<String>,
}

/// Metadata an extractor recovers from one stored package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    pub digest: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("invalid chart package filename: {0}")]
    InvalidFilename(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Turns stored objects into chart metadata.
///
/// Returning `Ok(None)` skips the object (not a chart package).
#[async_trait]
pub trait ChartExtractor: Send + Sync {
    async fn extract(
        &self,
        storage: &dyn StorageBackend,
        prefix: &str,
        object: &StorageObject,
    ) -> Result<Option<ChartMetadata>, ChartError>;
}

/// Derives name and version from `<name>-<version>.tgz` without reading content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameExtractor;

#[async_trait]
impl ChartExtractor for FilenameExtractor {
    async fn extract(
        &self,
        _storage: &dyn StorageBackend,
        _prefix: &str,
        object: &StorageObject,
    ) -> Result<Option<ChartMetadata>, ChartError> {
        if !object.is_top_level() || !object.key.ends_with(CHART_PACKAGE_EXTENSION) {
            return Ok(None);
        }
        let (name, version) = parse_chart_filename(&object.key)
            .ok_or_else(|| ChartError::InvalidFilename(object.key.clone()))?;
        Ok(Some(ChartMetadata {
            name,
            version,
            digest: None,
        }))
    }
}

/// Split `<name>-<version>.tgz` into its parts.
///
/// The version starts after a `-` followed by a digit. When several such
/// positions exist, the first one whose remainder is valid semver wins, then
/// the last one.
pub fn parse_chart_filename(filename: &str) -> Option<(String, String)> {
    let stem = filename.strip_suffix(CHART_PACKAGE_EXTENSION)?;

    let candidates: Vec<usize> = stem
        .char_indices()
        .filter(|&(i, c)| {
            c == '-'
                && i > 0
                && stem[i + 1..]
                    .chars()
                    .next()
                    .is_some_and(|next| next.is_ascii_digit())
        })
        .map(|(i, _)| i)
        .collect();

    let split = candidates
        .iter()
        .copied()
        .find(|&i| semver::Version::parse(&stem[i + 1..]).is_ok())
        .or_else(|| candidates.last().copied())?;

    Some((stem[..split].to_string(), stem[split + 1..].to_string()))
}

/// Package filename for a chart version.
pub fn chart_package_filename(name: &str, version: &str) -> String {
    format!("{name}-{version}{CHART_PACKAGE_EXTENSION}")
}

/// Provenance filename for a chart version.
pub fn provenance_filename(name: &str, version: &str) -> String {
    format!("{name}-{version}{PROVENANCE_EXTENSION}")
}

/// Newest-first ordering: semver versions descending, then the rest descending.
pub fn compare_versions_desc(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va).then_with(|| b.cmp(a)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => b.cmp(a),
    }
}
