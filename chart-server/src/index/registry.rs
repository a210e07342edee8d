//! Per-repository index caches, created on first use.
//!
//! A cache is only kept while its repository has charts. Reads of an unknown
//! or empty repository build an index, serve it, and drop the cache again
//! once no wave is running, so request paths cannot grow the map.

use chart_storage::StorageBackend;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::builder::IndexBuilder;
use super::cache::{IndexCache, RegenerationResult};
use super::chart::CHART_PACKAGE_EXTENSION;
use super::IndexError;

/// Maps repository paths to their [`IndexCache`].
///
/// The root repository (depth 0) is keyed by `""`.
pub struct IndexRegistry {
    storage: Arc<dyn StorageBackend>,
    builder: IndexBuilder,
    limiter: Option<Arc<Semaphore>>,
    caches: Mutex<HashMap<String, Arc<IndexCache>>>,
}

impl IndexRegistry {
    pub fn new(storage: Arc<dyn StorageBackend>, builder: IndexBuilder) -> Self {
        Self {
            storage,
            builder,
            limiter: None,
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Allow at most `limit` repositories to regenerate at once. 0 means no limit.
    pub fn with_index_limit(mut self, limit: usize) -> Self {
        self.limiter = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// Cache for `repo`, creating an empty one if needed.
    pub fn cache(&self, repo: &str) -> Arc<IndexCache> {
        let repo = repo.trim_matches('/');
        let mut caches = self.lock_caches();
        let cache = caches.entry(repo.to_string()).or_insert_with(|| {
            debug!(repo = %repo, "Creating index cache");
            let cache = IndexCache::new(repo, Arc::clone(&self.storage), self.builder.clone());
            Arc::new(match &self.limiter {
                Some(limiter) => cache.with_limiter(Arc::clone(limiter)),
                None => cache,
            })
        });
        Arc::clone(cache)
    }

    /// Current index of `repo`, see [`IndexCache::get_index`].
    ///
    /// The cache is released afterwards unless the repository has charts.
    pub async fn get_index(&self, repo: &str) -> RegenerationResult {
        let cache = self.cache(repo);
        let result = cache.get_index().await;
        let populated = matches!(&result, Ok(index) if index.chart_count() > 0);
        if !populated {
            self.release(&cache);
        }
        result
    }

    fn release(&self, cache: &Arc<IndexCache>) {
        let mut caches = self.lock_caches();
        let idle = caches
            .get(cache.repo())
            .is_some_and(|existing| Arc::ptr_eq(existing, cache) && cache.is_idle());
        if idle {
            caches.remove(cache.repo());
            debug!(repo = %cache.repo(), "Released index cache of empty repository");
        }
    }

    /// Build the index of every repository found in storage.
    ///
    /// At depth 0 that is the root repository alone, built even when storage
    /// holds no charts so a broken backend surfaces here. Returns the primed
    /// repository paths.
    pub async fn prime(&self, depth: usize) -> Result<Vec<String>, IndexError> {
        let repos = if depth == 0 {
            vec![String::new()]
        } else {
            self.discover_repositories(depth).await?
        };

        for repo in &repos {
            let cache = self.cache(repo);
            let index = cache.sync_index().await?;
            info!(
                repo = %repo,
                charts = index.chart_count(),
                hash = %index.content_hash,
                "Repository index primed"
            );
            if index.chart_count() == 0 {
                self.release(&cache);
            }
        }
        Ok(repos)
    }

    /// Repository paths, at most `depth` segments deep, holding a chart package.
    async fn discover_repositories(&self, depth: usize) -> Result<Vec<String>, IndexError> {
        let objects = self
            .storage
            .list_objects("")
            .await
            .map_err(|e| IndexError::StorageList(e.to_string()))?;

        let repos: BTreeSet<String> = objects
            .iter()
            .filter(|object| object.key.ends_with(CHART_PACKAGE_EXTENSION))
            .filter_map(|object| object.key.rsplit_once('/').map(|(repo, _)| repo))
            .filter(|repo| repo.split('/').count() <= depth)
            .map(str::to_string)
            .collect();
        Ok(repos.into_iter().collect())
    }

    /// Mark one repository's index stale, if it has a cache.
    pub fn invalidate(&self, repo: &str) {
        let existing = self.lock_caches().get(repo.trim_matches('/')).cloned();
        if let Some(cache) = existing {
            cache.invalidate();
        }
    }

    /// Repository paths with a cache, sorted.
    pub fn repositories(&self) -> Vec<String> {
        let mut repos: Vec<String> = self.lock_caches().keys().cloned().collect();
        repos.sort();
        repos
    }

    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    fn lock_caches(&self) -> MutexGuard<'_, HashMap<String, Arc<IndexCache>>> {
        self.caches.lock().unwrap_or_else(|poisoned| {
            warn!("Index registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
