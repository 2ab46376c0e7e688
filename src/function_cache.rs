//! Function Cache
//!
//! Memoization facade combining key derivation, entry storage, group expiry
//! and set/delete notifications.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info};

use crate::cache::{
    CacheEntry, CacheIdentifier, CacheKey, CacheStats, CacheStore, Cached, ContentHasher,
    EntryKey, FxContentHasher, GroupKey, KeyDeriver,
};
use crate::computation::Computation;
use crate::config::{CacheConfig, ConfigUpdate, DeleteOptions, GetOptions};
use crate::error::{CacheError, Result};
use crate::notify::{dispatch_delete, dispatch_set, DeleteEvent, SetEvent};
use crate::tasks::ExpiryManager;

static GLOBAL: Lazy<FunctionCache> =
    Lazy::new(|| FunctionCache::with_config(CacheConfig::from_env()));

#[derive(Default)]
struct State {
    store: CacheStore,
    expiry: ExpiryManager,
    stats: CacheStats,
}

struct Inner {
    deriver: KeyDeriver,
    config: RwLock<CacheConfig>,
    state: Mutex<State>,
    /// Per-key gates for computations in progress
    flights: Mutex<FxHashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

// == Function Cache ==
/// Memoizes computations by source text and arguments.
///
/// Cloning is cheap and every clone shares the same entries, timers and
/// configuration. Internal locks are never held across an `.await` or while
/// a callback runs, so callbacks may call back into the cache.
#[derive(Clone)]
pub struct FunctionCache {
    inner: Arc<Inner>,
}

impl FunctionCache {
    // == Constructors ==
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_hasher(config, Arc::new(FxContentHasher))
    }

    /// Creates a cache fingerprinting keys with `hasher`.
    pub fn with_hasher(config: CacheConfig, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                deriver: KeyDeriver::new(hasher),
                config: RwLock::new(config),
                state: Mutex::new(State::default()),
                flights: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// The process-wide cache, configured from the environment on first use.
    pub fn global() -> &'static FunctionCache {
        &GLOBAL
    }

    pub fn key_deriver(&self) -> &KeyDeriver {
        &self.inner.deriver
    }

    // == Configuration ==
    /// Changes the default callbacks and event names for all later calls.
    pub fn configure(&self, update: ConfigUpdate) {
        self.inner.config.write().apply(update);
    }

    /// Applies event names from JSON, ignoring malformed options.
    pub fn configure_from_json(&self, options: &Value) -> usize {
        self.inner.config.write().apply_json(options)
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.config.read().clone()
    }

    // == Get ==
    /// Returns the cached result of `computation(args)`, computing and
    /// storing it on a miss.
    ///
    /// Concurrent misses for the same key run the computation once; the
    /// other callers wait and receive the stored result. A failed
    /// computation is returned as [`CacheError::Computation`] and not cached.
    pub async fn get<F, Fut, A, T, E>(
        &self,
        computation: &Computation<F>,
        args: A,
        options: GetOptions,
    ) -> Result<Cached<T>, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Serialize,
        T: Send + Sync + 'static,
    {
        let key = self
            .inner
            .deriver
            .computation_key(computation.source(), &args)?;

        if let Some(hit) = self
            .inner
            .lookup::<T>(&key, true)
            .map_err(CacheError::widen::<E>)?
        {
            return Ok(hit);
        }
        let runtime = runtime_for(&options).map_err(CacheError::widen::<E>)?;

        let flight = Flight::join(&self.inner, &key);
        let _permit = flight.enter().await;
        if let Some(hit) = self
            .inner
            .lookup::<T>(&key, true)
            .map_err(CacheError::widen::<E>)?
        {
            debug!(key = %key, "Result stored by a concurrent computation");
            return Ok(hit);
        }
        self.inner.record_miss(&key);

        let value = (computation.func())(args)
            .await
            .map_err(CacheError::Computation)?;
        self.inner
            .commit(key, value, &options, runtime.as_ref())
            .map_err(CacheError::widen)
    }

    /// Synchronous form of [`FunctionCache::get`].
    ///
    /// Does not wait for an async computation of the same key that is in
    /// progress. A TTL still needs a Tokio runtime to schedule the expiry.
    pub fn get_sync<F, A, T, E>(
        &self,
        computation: &Computation<F>,
        args: A,
        options: GetOptions,
    ) -> Result<Cached<T>, E>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        A: Serialize,
        T: Send + Sync + 'static,
    {
        let key = self
            .inner
            .deriver
            .computation_key(computation.source(), &args)?;

        if let Some(hit) = self
            .inner
            .lookup::<T>(&key, true)
            .map_err(CacheError::widen::<E>)?
        {
            return Ok(hit);
        }
        let runtime = runtime_for(&options).map_err(CacheError::widen::<E>)?;
        self.inner.record_miss(&key);

        let value = (computation.func())(args).map_err(CacheError::Computation)?;
        self.inner
            .commit(key, value, &options, runtime.as_ref())
            .map_err(CacheError::widen)
    }

    /// Reads a cached value without computing or counting the lookup.
    pub fn peek<T: 'static>(&self, key: &CacheKey) -> Result<Option<Cached<T>>> {
        self.inner.lookup(key, false)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .state
            .lock()
            .store
            .lookup(&key.key1, &key.key2)
            .is_some()
    }

    // == Delete ==
    /// Removes cached results of `identifier`.
    ///
    /// With `args`, only the entry for that argument list is removed and the
    /// group's timer is left alone. The delete callback still fires for it,
    /// with `key2` set, so listeners see entry-level invalidations too.
    /// Without `args`, the whole group is removed and its timer cancelled.
    ///
    /// If the delete callback fails, the removal has already happened and
    /// the error is returned; a group's timer then stays pending and expires
    /// the (now empty) group on schedule.
    pub fn delete<I, A>(
        &self,
        identifier: &I,
        args: Option<&A>,
        options: DeleteOptions,
    ) -> Result<()>
    where
        I: CacheIdentifier + ?Sized,
        A: Serialize + ?Sized,
    {
        let (key1, key2) = self.inner.deriver.lookup_key(identifier, args)?;
        let (callback, event_name) = {
            let config = self.inner.config.read();
            (
                options.on_delete.clone().or_else(|| config.on_delete.clone()),
                config.delete_event_name.clone(),
            )
        };

        if let Some(key2) = key2 {
            self.inner.remove_entry(&key1, &key2);
            debug!(key1 = %key1, key2 = %key2, "Deleted cache entry");
            if let Some(callback) = callback {
                let event = DeleteEvent {
                    event_name: &event_name,
                    key1: &key1,
                    key2: Some(key2),
                };
                dispatch_delete(&callback, &event)?;
            }
            return Ok(());
        }

        self.inner.state.lock().store.remove_group(&key1);
        debug!(key1 = %key1, "Deleted cache group");

        if !options.skip_timer_clear {
            if let Some(callback) = callback {
                let event = DeleteEvent {
                    event_name: &event_name,
                    key1: &key1,
                    key2: None,
                };
                dispatch_delete(&callback, &event)?;
            }
        }

        self.inner
            .state
            .lock()
            .expiry
            .clear(&key1, !options.skip_timer_clear);
        Ok(())
    }

    /// Removes every cached result of `identifier`.
    pub fn delete_group<I>(&self, identifier: &I, options: DeleteOptions) -> Result<()>
    where
        I: CacheIdentifier + ?Sized,
    {
        self.delete(identifier, None::<&()>, options)
    }

    // == Delete By Keys ==
    /// Removes by already-derived keys, without callbacks.
    ///
    /// Intended for keys taken from a set or delete event payload.
    pub fn delete_by_keys(&self, key1: &GroupKey, key2: Option<EntryKey>) {
        match key2 {
            Some(key2) => self.inner.remove_entry(key1, &key2),
            None => {
                let mut state = self.inner.state.lock();
                state.store.remove_group(key1);
                state.expiry.clear(key1, true);
            }
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.groups = state.store.group_count();
        stats.entries = state.store.len();
        stats.pending_timers = state.expiry.len();
        stats
    }
}

impl Default for FunctionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCache")
            .field("config", &*self.inner.config.read())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Inner {
    /// Reads `key`, counting a hit when `count_hit` is set.
    ///
    /// Misses are counted by [`Inner::record_miss`] once the caller is about
    /// to compute, so a caller served by a concurrent computation scores a hit.
    fn lookup<T: 'static>(&self, key: &CacheKey, count_hit: bool) -> Result<Option<Cached<T>>> {
        let mut state = self.state.lock();
        let found = match state.store.lookup(&key.key1, &key.key2) {
            Some(entry) => match entry.cached::<T>() {
                Some(cached) => Some(cached),
                None => return Err(CacheError::TypeMismatch { key: key.clone() }),
            },
            None => None,
        };

        if count_hit && found.is_some() {
            state.stats.record_hit();
            debug!(key = %key, "Cache hit");
        }
        Ok(found)
    }

    fn record_miss(&self, key: &CacheKey) {
        self.state.lock().stats.record_miss();
        debug!(key = %key, "Cache miss");
    }

    // == Commit ==
    /// Notifies the set callback, stores the value and schedules expiry.
    fn commit<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        key: CacheKey,
        value: T,
        options: &GetOptions,
        runtime: Option<&Handle>,
    ) -> Result<Cached<T>> {
        let ttl = options.effective_ttl();
        let (callback, event_name) = {
            let config = self.config.read();
            (
                options.on_set.clone().or_else(|| config.on_set.clone()),
                config.set_event_name.clone(),
            )
        };

        if let Some(callback) = callback {
            let event = SetEvent {
                event_name: &event_name,
                key: &key,
                value: &value,
                ttl: ttl.unwrap_or_default(),
                no_freeze: options.no_freeze,
            };
            dispatch_set(&callback, &event)?;
        }

        let cached = Cached::new(value, !options.no_freeze);
        let mut state = self.state.lock();
        state.store.store(
            key.key1.clone(),
            key.key2,
            CacheEntry::from_cached(cached.clone()),
        );
        debug!(key = %key, frozen = !options.no_freeze, "Stored computation result");

        if let (Some(ttl), Some(runtime)) = (ttl, runtime) {
            let inner = Arc::downgrade(self);
            let key1 = key.key1.clone();
            state.expiry.schedule(key.key1, ttl, runtime, move |generation| {
                if let Some(inner) = inner.upgrade() {
                    inner.expire(&key1, generation);
                }
            });
        }
        Ok(cached)
    }

    /// Removes one entry, dropping its group if that left it empty and no
    /// timer still refers to it.
    fn remove_entry(&self, key1: &GroupKey, key2: &EntryKey) {
        let mut state = self.state.lock();
        state.store.remove_entry(key1, key2);
        if !state.expiry.has_timer(key1) {
            state.store.prune_if_empty(key1);
        }
    }

    // == Expire ==
    /// Timer body: a group delete that keeps quiet and leaves the already
    /// fired timer alone.
    fn expire(&self, key1: &GroupKey, generation: u64) {
        let mut state = self.state.lock();
        if !state.expiry.is_current(key1, generation) {
            debug!(key1 = %key1, "Ignoring stale expiry timer");
            return;
        }

        state.store.remove_group(key1);
        state.expiry.clear(key1, false);
        state.stats.record_expiration();
        info!(key1 = %key1, "Cache group expired");
    }
}

/// Handle to the Tokio runtime when `options` asks for expiry.
fn runtime_for(options: &GetOptions) -> Result<Option<Handle>> {
    match options.effective_ttl() {
        Some(_) => Handle::try_current()
            .map(Some)
            .map_err(|_| CacheError::NoRuntime),
        None => Ok(None),
    }
}

// == Flight ==
/// Membership in the set of callers computing one key.
///
/// The gate is removed from the table when its last member leaves.
struct Flight<'a> {
    inner: &'a Inner,
    key: CacheKey,
    gate: Arc<AsyncMutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(inner: &'a Inner, key: &CacheKey) -> Self {
        let gate = Arc::clone(inner.flights.lock().entry(key.clone()).or_default());
        Self {
            inner,
            key: key.clone(),
            gate,
        }
    }

    async fn enter(&self) -> AsyncMutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut flights = self.inner.flights.lock();
        // the table and this flight hold the only references
        if Arc::strong_count(&self.gate) == 2 {
            flights.remove(&self.key);
        }
    }
}
