//! # Coalescing Index Cache
//!
//! Holds the current [`RepositoryIndex`] for one repository and rebuilds it
//! from storage when it is missing or stale.
//!
//! Rebuilds happen in *waves*. The first caller to find no rebuild running
//! becomes the leader and scans storage with no lock held. Callers arriving
//! while the leader works register a one-shot channel and wait. When the
//! leader finishes it installs the new index (on success), hands the same
//! result to every registered waiter and clears the in-progress flag, all in
//! one critical section. A wave therefore costs exactly one storage listing
//! however many requests pile up behind it.
//!
//! A failed wave leaves the previous index in place; [`IndexCache::get_index`]
//! keeps serving it until a later wave succeeds.
//!
//! Caches sharing a limiter (see [`IndexCache::with_limiter`]) take a permit
//! for the storage scan, bounding how many repositories rebuild at once.

use chart_storage::StorageBackend;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};

use super::builder::{storage_prefix, IndexBuilder, ObjectSnapshot, RepositoryIndex};
use super::IndexError;
use crate::metrics;

/// Outcome of one regeneration wave, shared by the leader and its waiters.
pub type RegenerationResult = Result<Arc<RepositoryIndex>, IndexError>;

#[derive(Default)]
struct CacheState {
    current: Option<Arc<RepositoryIndex>>,
    /// Objects behind `current`, reused by the next build.
    snapshot: Arc<ObjectSnapshot>,
    /// Bumped by every invalidation.
    generation: u64,
    /// Generation the current index was built for.
    built_generation: u64,
    regenerating: bool,
    waiters: Vec<oneshot::Sender<RegenerationResult>>,
}

impl CacheState {
    fn fresh(&self) -> Option<Arc<RepositoryIndex>> {
        if self.built_generation != self.generation {
            return None;
        }
        self.current.clone()
    }
}

enum Role {
    Leader { generation: u64 },
    Waiter(oneshot::Receiver<RegenerationResult>),
}

/// Index cache for a single repository.
pub struct IndexCache {
    repo: String,
    prefix: String,
    storage: Arc<dyn StorageBackend>,
    builder: IndexBuilder,
    limiter: Option<Arc<Semaphore>>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("repo", &self.repo)
            .field("backend", &self.storage.backend_name())
            .finish_non_exhaustive()
    }
}

impl IndexCache {
    /// Create an empty cache for `repo`; the first read triggers a build.
    pub fn new(
        repo: impl Into<String>,
        storage: Arc<dyn StorageBackend>,
        builder: IndexBuilder,
    ) -> Self {
        let repo = repo.into();
        let prefix = storage_prefix(&repo);
        Self {
            repo,
            prefix,
            storage,
            builder,
            limiter: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Take a permit from `limiter` for every storage scan.
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Storage prefix this repository's objects live under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current index, rebuilding first when none exists or it is stale.
    ///
    /// When the rebuild fails the previous index is returned instead. Only a
    /// cache that never built successfully reports
    /// [`IndexError::NoIndexAvailable`].
    pub async fn get_index(&self) -> RegenerationResult {
        let fresh = self.lock_state().fresh();
        if let Some(index) = fresh {
            return Ok(index);
        }

        match self.sync_index().await {
            Ok(index) => Ok(index),
            Err(err) => match self.current() {
                Some(previous) => {
                    warn!(
                        repo = %self.repo,
                        error = %err,
                        hash = %previous.content_hash,
                        "Index regeneration failed, serving previous index"
                    );
                    Ok(previous)
                }
                None => Err(IndexError::NoIndexAvailable(err.to_string())),
            },
        }
    }

    /// Mark the index stale. The next read starts a new wave.
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        debug!(repo = %self.repo, generation = state.generation, "Index invalidated");
    }

    /// Rebuild the index, or join the rebuild already in flight.
    pub async fn sync_index(&self) -> RegenerationResult {
        let role = {
            let mut state = self.lock_state();
            if state.regenerating {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Role::Waiter(rx)
            } else {
                state.regenerating = true;
                Role::Leader {
                    generation: state.generation,
                }
            }
        };

        match role {
            Role::Waiter(rx) => {
                debug!(repo = %self.repo, "Joining in-flight index regeneration");
                rx.await.unwrap_or_else(|_| Err(IndexError::Interrupted))
            }
            Role::Leader { generation } => self.lead_wave(generation).await,
        }
    }

    /// Last successfully built index, stale or not.
    pub fn current(&self) -> Option<Arc<RepositoryIndex>> {
        self.lock_state().current.clone()
    }

    /// True when the next read would start a rebuild.
    pub fn is_stale(&self) -> bool {
        self.lock_state().fresh().is_none()
    }

    /// Number of callers parked on the wave in flight.
    pub fn waiter_count(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// True when no wave is running.
    pub fn is_idle(&self) -> bool {
        !self.lock_state().regenerating
    }

    async fn lead_wave(&self, generation: u64) -> RegenerationResult {
        info!(
            repo = %self.repo,
            backend = self.storage.backend_name(),
            "Regenerating repository index"
        );

        let mut guard = WaveGuard {
            cache: self,
            finished: false,
        };
        let result = self.regenerate().await;
        let (result, snapshot) = match result {
            Ok((index, snapshot)) => (Ok(index), Some(snapshot)),
            Err(e) => (Err(e), None),
        };
        let waiters = self.finish_wave(generation, &result, snapshot);
        guard.finished = true;

        match &result {
            Ok(index) => {
                metrics::record_regeneration("success");
                info!(
                    repo = %self.repo,
                    charts = index.chart_count(),
                    versions = index.version_count(),
                    waiters,
                    hash = %index.content_hash,
                    "Repository index regenerated"
                );
            }
            Err(err) => {
                metrics::record_regeneration("failure");
                warn!(
                    repo = %self.repo,
                    waiters,
                    error = %err,
                    "Repository index regeneration failed"
                );
            }
        }
        result
    }

    async fn regenerate(&self) -> Result<(Arc<RepositoryIndex>, ObjectSnapshot), IndexError> {
        let _permit = match &self.limiter {
            Some(limiter) => {
                if limiter.available_permits() == 0 {
                    debug!(repo = %self.repo, "Waiting for an index regeneration slot");
                }
                Some(
                    limiter
                        .acquire()
                        .await
                        .map_err(|_| IndexError::Interrupted)?,
                )
            }
            None => None,
        };

        let objects = self
            .storage
            .list_objects(&self.prefix)
            .await
            .map_err(|e| IndexError::StorageList(e.to_string()))?;
        let previous = Arc::clone(&self.lock_state().snapshot);
        let (index, snapshot) = self
            .builder
            .build_from_snapshot(self.storage.as_ref(), &self.repo, &objects, &previous)
            .await?;
        Ok((Arc::new(index), snapshot))
    }

    /// Install the result and release every waiter. Returns how many were released.
    fn finish_wave(
        &self,
        generation: u64,
        result: &RegenerationResult,
        snapshot: Option<ObjectSnapshot>,
    ) -> usize {
        let mut state = self.lock_state();
        if let Ok(index) = result {
            state.current = Some(Arc::clone(index));
            state.built_generation = generation;
        }
        if let Some(snapshot) = snapshot {
            state.snapshot = Arc::new(snapshot);
        }
        let waiters = std::mem::take(&mut state.waiters);
        let released = waiters.len();
        for tx in waiters {
            // A waiter that went away no longer needs the result.
            let _ = tx.send(result.clone());
        }
        state.regenerating = false;
        released
    }

    fn abandon_wave(&self) {
        let mut state = self.lock_state();
        let waiters = std::mem::take(&mut state.waiters);
        for tx in waiters {
            let _ = tx.send(Err(IndexError::Interrupted));
        }
        state.regenerating = false;
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(repo = %self.repo, "Index cache state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Releases the wave if the leader's future is dropped before it finishes.
struct WaveGuard<'a> {
    cache: &'a IndexCache,
    finished: bool,
}

impl Drop for WaveGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(repo = %self.cache.repo, "Index regeneration abandoned by its leader");
            metrics::record_regeneration("interrupted");
            self.cache.abandon_wave();
        }
    }
}
