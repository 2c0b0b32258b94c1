//! Tile buffer cache
//!
//! Keyed by `(tile, style hash)`. The first request for a key starts one
//! detached build on a blocking worker and every request for that key,
//! including ones made after an earlier caller gave up, waits on the same
//! build through the entry's watch channel.
//!
//! Entries are reference counted by renderer attachments. An unreferenced
//! entry stays resident until [`TileCache::trim`] needs the memory or the
//! tile is evicted, so a tile that scrolls back into view is reused.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use rustc_hash::FxBuildHasher;
use strata_style::{CompiledStyle, StyleHash};
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::buffers::TileBuffers;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::tessellate::TileBuilder;
use crate::tile::{DecodedTile, TileId};
use crate::upload::GpuTileBuffers;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub tile: TileId,
    pub style: StyleHash,
}

impl CacheKey {
    pub fn new(tile: TileId, style: StyleHash) -> Self {
        Self { tile, style }
    }
}

/// Result of [`TileCache::get_or_build`]
#[derive(Clone, Debug)]
pub enum BuildOutcome {
    Ready(Arc<TileBuffers>),
    /// The entry was evicted while its build ran; the result was dropped
    Abandoned,
}

impl BuildOutcome {
    pub fn ready(self) -> Option<Arc<TileBuffers>> {
        match self {
            BuildOutcome::Ready(buffers) => Some(buffers),
            BuildOutcome::Abandoned => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Requests that awaited another caller's build
    pub coalesced: u64,
    pub builds: u64,
    pub abandoned: u64,
    pub resident_bytes: u64,
    pub entries: usize,
}

type BuildResult = Result<Arc<TileBuffers>, Arc<JoinError>>;

/// Publishes the single build of one entry; `None` while it runs
type BuildSlot = Arc<watch::Sender<Option<BuildResult>>>;

struct CacheEntry<G> {
    build: BuildSlot,
    refs: usize,
    bytes: u64,
    gpu: Option<Arc<G>>,
}

impl<G> CacheEntry<G> {
    fn new() -> Self {
        Self {
            build: Arc::new(watch::Sender::new(None)),
            refs: 0,
            bytes: 0,
            gpu: None,
        }
    }

    fn buffers(&self) -> Option<Arc<TileBuffers>> {
        match &*self.build.borrow() {
            Some(Ok(buffers)) => Some(Arc::clone(buffers)),
            _ => None,
        }
    }

    fn failed(&self) -> bool {
        matches!(&*self.build.borrow(), Some(Err(_)))
    }
}

struct CacheState<G> {
    /// Most recently used first
    entries: LruCache<CacheKey, CacheEntry<G>, FxBuildHasher>,
    stats: CacheStats,
}

impl<G> CacheState<G> {
    fn resident_bytes(&self) -> u64 {
        self.entries.iter().map(|(_, e)| e.bytes).sum()
    }

    /// Remove every entry matching `pred`, returning how many went
    fn remove_where(&mut self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| pred(key))
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            self.entries.pop(key);
        }
        keys.len()
    }
}

fn lock_state<G>(state: &Mutex<CacheState<G>>) -> MutexGuard<'_, CacheState<G>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared tile buffer cache.
///
/// `G` is the GPU-side handle attached by [`TileCache::upload_with`].
pub struct TileCache<G = GpuTileBuffers> {
    builder: Arc<dyn TileBuilder>,
    config: CacheConfig,
    state: Arc<Mutex<CacheState<G>>>,
}

impl<G: Send + Sync + 'static> TileCache<G> {
    pub fn new(builder: impl TileBuilder, config: CacheConfig) -> Self {
        Self {
            builder: Arc::new(builder),
            config,
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::unbounded_with_hasher(FxBuildHasher),
                stats: CacheStats::default(),
            })),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<G>> {
        lock_state(&self.state)
    }

    /// Buffers for `tile` under `style`, building them at most once per key.
    ///
    /// Must be called inside a tokio runtime. The build runs to completion
    /// even if this future is dropped. Returns [`BuildOutcome::Abandoned`]
    /// when the tile was evicted before the build finished.
    pub async fn get_or_build(
        &self,
        tile: Arc<DecodedTile>,
        style: Arc<CompiledStyle>,
    ) -> Result<BuildOutcome, CacheError> {
        let key = CacheKey::new(tile.id, style.hash());
        let slot = {
            let mut guard = self.lock();
            let state = &mut *guard;
            // A failed build is retried by the next request
            if state.entries.peek(&key).is_some_and(CacheEntry::failed) {
                state.entries.pop(&key);
            }
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    if entry.buffers().is_some() {
                        state.stats.hits += 1;
                    } else {
                        state.stats.misses += 1;
                        state.stats.coalesced += 1;
                    }
                    Arc::clone(&entry.build)
                }
                None => {
                    state.stats.misses += 1;
                    let entry = CacheEntry::new();
                    let slot = Arc::clone(&entry.build);
                    state.entries.put(key, entry);
                    self.spawn_build(key, Arc::clone(&slot), tile, style);
                    slot
                }
            }
        };

        let mut done = slot.subscribe();
        // An error here means the build task was torn down with its runtime
        let result = done
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|published| (*published).clone());
        let buffers = match result {
            Some(Ok(buffers)) => buffers,
            Some(Err(source)) => {
                return Err(CacheError::BuildFailed {
                    tile: key.tile,
                    source,
                })
            }
            None => return Ok(BuildOutcome::Abandoned),
        };

        let state = self.lock();
        match state.entries.peek(&key) {
            Some(entry) if Arc::ptr_eq(&entry.build, &slot) => Ok(BuildOutcome::Ready(buffers)),
            _ => Ok(BuildOutcome::Abandoned),
        }
    }

    /// Run the build for `key` detached from any caller and publish it
    fn spawn_build(
        &self,
        key: CacheKey,
        slot: BuildSlot,
        tile: Arc<DecodedTile>,
        style: Arc<CompiledStyle>,
    ) {
        let builder = Arc::clone(&self.builder);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result: BuildResult =
                tokio::task::spawn_blocking(move || builder.build(&tile, &style))
                    .await
                    .map(Arc::new)
                    .map_err(Arc::new);

            {
                let mut guard = lock_state(&state);
                let state = &mut *guard;
                match state.entries.peek_mut(&key) {
                    Some(entry) if Arc::ptr_eq(&entry.build, &slot) => match &result {
                        Ok(buffers) => {
                            entry.bytes = buffers.byte_size();
                            state.stats.builds += 1;
                            tracing::debug!(
                                tile = %key.tile,
                                style = %key.style,
                                bytes = entry.bytes,
                                "tile buffers built"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(tile = %key.tile, style = %key.style, "tile build failed: {}", err);
                        }
                    },
                    _ => {
                        state.stats.abandoned += 1;
                        tracing::warn!(tile = %key.tile, style = %key.style, "discarding build for evicted tile");
                    }
                }
            }
            slot.send_replace(Some(result));
        });
    }

    /// Finished buffers for `key`, without building
    pub fn get(&self, key: CacheKey) -> Option<Arc<TileBuffers>> {
        self.lock().entries.peek(&key).and_then(CacheEntry::buffers)
    }

    pub fn gpu(&self, key: CacheKey) -> Option<Arc<G>> {
        self.lock().entries.peek(&key).and_then(|e| e.gpu.clone())
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.lock().entries.contains(&key)
    }

    /// Record a renderer attachment. Returns false for unknown keys.
    pub fn attach(&self, key: CacheKey) -> bool {
        match self.lock().entries.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    pub fn detach(&self, key: CacheKey) {
        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    pub fn refs(&self, key: CacheKey) -> usize {
        self.lock().entries.peek(&key).map_or(0, |e| e.refs)
    }

    /// Release unreferenced, finished entries least recently used first
    /// until resident bytes fit the memory budget. Returns the number of
    /// entries released.
    pub fn trim(&self) -> usize {
        let mut state = self.lock();
        let budget = self.config.memory_budget_bytes;
        let mut resident = state.resident_bytes();
        if resident <= budget {
            return 0;
        }

        let mut victims = Vec::new();
        for (key, entry) in state.entries.iter().rev() {
            if resident <= budget {
                break;
            }
            if entry.refs == 0 && entry.buffers().is_some() {
                victims.push(*key);
                resident -= entry.bytes;
            }
        }
        for key in &victims {
            state.entries.pop(key);
        }
        tracing::debug!(released = victims.len(), resident_bytes = resident, budget, "trimmed tile cache");
        victims.len()
    }

    /// Dispose every entry of `tile`, whatever its style or refcount.
    ///
    /// Builds still running for the tile finish as
    /// [`BuildOutcome::Abandoned`].
    pub fn evict(&self, tile: TileId) -> usize {
        let removed = self.lock().remove_where(|key| key.tile == tile);
        tracing::debug!(tile = %tile, removed, "evicted tile");
        removed
    }

    /// Drop every entry built with `style`
    pub fn invalidate_style(&self, style: StyleHash) -> usize {
        let removed = self.lock().remove_where(|key| key.style == style);
        tracing::debug!(style = %style, removed, "invalidated style");
        removed
    }

    /// Attach a GPU handle to a finished entry, creating it with `upload`
    /// on first use. Call from the thread that owns the device.
    ///
    /// Returns `Ok(None)` when the entry is missing or still building.
    pub fn upload_with<E>(
        &self,
        key: CacheKey,
        upload: impl FnOnce(&TileBuffers) -> Result<G, E>,
    ) -> Result<Option<Arc<G>>, E> {
        let (slot, buffers) = {
            let state = self.lock();
            let Some(entry) = state.entries.peek(&key) else {
                return Ok(None);
            };
            if let Some(gpu) = &entry.gpu {
                return Ok(Some(Arc::clone(gpu)));
            }
            let Some(buffers) = entry.buffers() else {
                return Ok(None);
            };
            (Arc::clone(&entry.build), buffers)
        };

        let gpu = Arc::new(upload(&buffers)?);

        let mut state = self.lock();
        match state.entries.get_mut(&key) {
            Some(entry) if Arc::ptr_eq(&entry.build, &slot) => {
                Ok(Some(Arc::clone(entry.gpu.get_or_insert(gpu))))
            }
            // Evicted during upload
            _ => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            resident_bytes: state.resident_bytes(),
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
