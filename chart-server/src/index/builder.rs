//! Deterministic `index.yaml` construction from a storage listing.

use bytes::Bytes;
use chart_storage::{StorageBackend, StorageObject};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::chart::{
    compare_versions_desc, ChartError, ChartExtractor, ChartMetadata, ChartVersion,
    FilenameExtractor,
};
use super::IndexError;

const INDEX_API_VERSION: &str = "v1";

/// One built repository index. Replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct RepositoryIndex {
    /// Chart name to versions, newest first.
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
    /// Canonical `index.yaml` serialization of `entries`.
    pub raw: Bytes,
    /// Wall-clock time the build finished.
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 of `raw`.
    pub content_hash: String,
}

impl RepositoryIndex {
    pub fn chart_count(&self) -> usize {
        self.entries.len()
    }

    pub fn version_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn chart(&self, name: &str) -> Option<&[ChartVersion]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Look up one version; `latest` resolves to the newest.
    pub fn chart_version(&self, name: &str, version: &str) -> Option<&ChartVersion> {
        let versions = self.entries.get(name)?;
        if version == "latest" {
            return versions.first();
        }
        versions.iter().find(|v| v.version == version)
    }
}

/// Extraction results of the objects seen by the previous build.
///
/// An object whose key, size and modification time are unchanged is not
/// handed to the extractor again.
#[derive(Debug, Clone, Default)]
pub struct ObjectSnapshot {
    objects: HashMap<String, SnapshotEntry>,
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    size: u64,
    last_modified: DateTime<Utc>,
    metadata: Option<ChartMetadata>,
}

impl ObjectSnapshot {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn lookup(&self, object: &StorageObject) -> Option<Option<ChartMetadata>> {
        self.objects
            .get(&object.key)
            .filter(|e| e.size == object.size && e.last_modified == object.last_modified)
            .map(|e| e.metadata.clone())
    }

    fn insert(&mut self, object: &StorageObject, metadata: Option<ChartMetadata>) {
        self.objects.insert(
            object.key.clone(),
            SnapshotEntry {
                size: object.size,
                last_modified: object.last_modified,
                metadata,
            },
        );
    }
}

#[derive(Serialize)]
struct IndexDocument<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    entries: &'a BTreeMap<String, Vec<ChartVersion>>,
    generated: DateTime<Utc>,
}

/// Builds [`RepositoryIndex`] values for one URL layout.
#[derive(Clone)]
pub struct IndexBuilder {
    extractor: Arc<dyn ChartExtractor>,
    chart_url: Option<String>,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("chart_url", &self.chart_url)
            .finish_non_exhaustive()
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(Arc::new(FilenameExtractor), None)
    }
}

impl IndexBuilder {
    pub fn new(extractor: Arc<dyn ChartExtractor>, chart_url: Option<String>) -> Self {
        let chart_url = chart_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self {
            extractor,
            chart_url,
        }
    }

    /// Download URL for a package or provenance file in `repo`.
    pub fn chart_url_for(&self, repo: &str, filename: &str) -> String {
        match (&self.chart_url, repo.is_empty()) {
            (Some(base), true) => format!("{base}/charts/{filename}"),
            (Some(base), false) => format!("{base}/{repo}/charts/{filename}"),
            (None, _) => format!("charts/{filename}"),
        }
    }

    /// Build the index for `repo` from a listing of its storage prefix.
    ///
    /// The output depends only on the listing, so the same objects always give
    /// the same bytes.
    pub async fn build(
        &self,
        storage: &dyn StorageBackend,
        repo: &str,
        objects: &[StorageObject],
    ) -> Result<RepositoryIndex, IndexError> {
        let (index, _) = self
            .build_from_snapshot(storage, repo, objects, &ObjectSnapshot::default())
            .await?;
        Ok(index)
    }

    /// Build like [`build`](Self::build), reusing extraction results from
    /// `previous` for unchanged objects. Returns the snapshot for the next build.
    pub async fn build_from_snapshot(
        &self,
        storage: &dyn StorageBackend,
        repo: &str,
        objects: &[StorageObject],
        previous: &ObjectSnapshot,
    ) -> Result<(RepositoryIndex, ObjectSnapshot), IndexError> {
        let prefix = storage_prefix(repo);
        let mut entries: BTreeMap<String, Vec<ChartVersion>> = BTreeMap::new();
        let mut newest: Option<DateTime<Utc>> = None;
        let mut snapshot = ObjectSnapshot::default();
        let mut reused = 0usize;

        for object in objects {
            let extracted = match previous.lookup(object) {
                Some(hit) => {
                    reused += 1;
                    hit
                }
                None => match self.extractor.extract(storage, &prefix, object).await {
                    Ok(extracted) => extracted,
                    Err(ChartError::InvalidFilename(key)) => {
                        warn!(repo = %repo, key = %key, "Skipping unparseable chart package");
                        continue;
                    }
                    Err(e) => return Err(IndexError::StorageBuild(e.to_string())),
                },
            };
            snapshot.insert(object, extracted.clone());
            let Some(metadata) = extracted else {
                continue;
            };

            newest = newest.max(Some(object.last_modified));
            entries
                .entry(metadata.name.clone())
                .or_default()
                .push(ChartVersion {
                    urls: vec![self.chart_url_for(repo, &object.key)],
                    name: metadata.name,
                    version: metadata.version,
                    created: object.last_modified,
                    digest: metadata.digest,
                });
        }

        for versions in entries.values_mut() {
            versions.sort_by(|a, b| compare_versions_desc(&a.version, &b.version));
        }

        let document = IndexDocument {
            api_version: INDEX_API_VERSION,
            entries: &entries,
            generated: newest.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        };
        let yaml = serde_yaml_ng::to_string(&document)
            .map_err(|e| IndexError::StorageBuild(format!("failed to serialize index: {e}")))?;
        let raw = Bytes::from(yaml);
        let content_hash = format!("{:x}", Sha256::digest(&raw));

        debug!(
            repo = %repo,
            charts = entries.len(),
            objects = objects.len(),
            reused,
            hash = %content_hash,
            "Repository index built"
        );

        let index = RepositoryIndex {
            entries,
            raw,
            generated_at: Utc::now(),
            content_hash,
        };
        Ok((index, snapshot))
    }
}

/// Storage prefix for a repository path, `""` for the root repository.
pub fn storage_prefix(repo: &str) -> String {
    let repo = repo.trim_matches('/');
    if repo.is_empty() {
        String::new()
    } else {
        format!("{repo}/")
    }
}
