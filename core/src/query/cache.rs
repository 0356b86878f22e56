//! Key-addressed query cache.
//!
//! # Design
//! One map from `QueryKey` to `Entry`, behind a single mutex that is never
//! held across an `.await`. Each entry carries its last value, staleness
//! bookkeeping, the fetch currently in flight (a `Shared` future, so every
//! concurrent reader of the key awaits the same network call) and the number
//! of live observers.
//!
//! A fetch is identified by a monotonically increasing id. Only the fetch
//! whose id is still recorded on the entry may write its result back:
//! invalidation detaches the in-flight fetch, so results that started before
//! a write can never land after it. When every reader of a fetch goes away
//! the fetch is dropped without touching the entry.
//!
//! Background refetches belong to the entry's observers. When the last
//! observer goes away they are aborted, so a torn-down view neither writes
//! the entry nor runs recovery for a late response.
//!
//! Eviction is lazy: every cache operation first sweeps entries that have
//! had no observers, no fetch, and no activity for `gc_time`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::key::QueryKey;
use crate::config::CacheConfig;
use crate::error::ApiError;

pub type FetchResult = Result<Value, ApiError>;

/// Produces one network fetch for a key. Called again for every refetch.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Freshness and retry policy applied to one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub stale_time: Duration,
    pub retry: u32,
}

struct InFlight {
    id: u64,
    future: SharedFetch,
    waiters: usize,
}

struct Entry {
    data: Option<Value>,
    error: Option<ApiError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    in_flight: Option<InFlight>,
    observers: usize,
    last_active: Instant,
    refetch: Option<(Fetcher, FetchPolicy)>,
    background: Vec<AbortHandle>,
}

impl Entry {
    fn new(now: Instant) -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            in_flight: None,
            observers: 0,
            last_active: now,
            refetch: None,
            background: Vec::new(),
        }
    }

    fn track_background(&mut self, handle: AbortHandle) {
        self.background.retain(|h| !h.is_finished());
        self.background.push(handle);
    }

    fn fresh_data(&self, now: Instant, stale_time: Duration) -> Option<Value> {
        if self.invalidated {
            return None;
        }
        let updated_at = self.updated_at?;
        if now.saturating_duration_since(updated_at) < stale_time {
            self.data.clone()
        } else {
            None
        }
    }
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub data: Option<Value>,
    pub error: Option<ApiError>,
    pub updated_at: Option<Instant>,
    pub is_invalidated: bool,
    pub is_fetching: bool,
    pub observers: usize,
}

impl EntrySnapshot {
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        match self.updated_at {
            Some(updated_at) => self.is_invalidated || updated_at.elapsed() >= stale_time,
            None => true,
        }
    }
}

struct Inner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    next_fetch_id: AtomicU64,
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn default_policy(&self) -> FetchPolicy {
        FetchPolicy {
            stale_time: self.inner.config.stale_time,
            retry: self.inner.config.retry,
        }
    }

    /// Read `key`, fetching through `fetcher` when needed.
    ///
    /// Fresh data is returned from memory. Data that is only past its stale
    /// time is returned as is while a background refetch runs (when a tokio
    /// runtime is available). Missing or invalidated data joins the fetch in
    /// flight for the key, or starts one.
    pub async fn fetch(&self, key: &QueryKey, fetcher: Fetcher, policy: FetchPolicy) -> FetchResult {
        let now = Instant::now();
        let runtime = Handle::try_current().ok();

        let (id, future) = {
            let mut entries = self.lock();
            self.sweep(&mut entries, now);
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now));
            entry.last_active = now;
            entry.refetch = Some((fetcher.clone(), policy));

            if let Some(data) = entry.fresh_data(now, policy.stale_time) {
                debug!(%key, "cache hit");
                return Ok(data);
            }

            let stale = if entry.invalidated {
                None
            } else {
                entry.data.clone()
            };
            if let (Some(data), Some(runtime)) = (stale, runtime.as_ref()) {
                if entry.in_flight.is_none() {
                    debug!(%key, "serving stale data, refetching in background");
                    let (id, future) = self.start(entry, &fetcher, policy);
                    let cache = self.clone();
                    let key = key.clone();
                    let task = runtime.spawn(async move {
                        let _ = cache.wait(key, id, future).await;
                    });
                    entry.track_background(task.abort_handle());
                }
                return Ok(data);
            }
            self.join_or_start(entry, &fetcher, policy)
        };

        self.wait(key.clone(), id, future).await
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Fetches in flight for those entries are detached and will not write
    /// their results. Entries that currently have observers are refetched in
    /// the background. Returns the number of entries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let now = Instant::now();
        let mut refetch = Vec::new();
        let count = {
            let mut entries = self.lock();
            self.sweep(&mut entries, now);
            let mut count = 0;
            for (key, entry) in entries.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                entry.invalidated = true;
                entry.in_flight = None;
                count += 1;
                if entry.observers > 0 {
                    if let Some((fetcher, policy)) = &entry.refetch {
                        refetch.push((key.clone(), fetcher.clone(), *policy));
                    }
                }
            }
            count
        };
        debug!(%prefix, count, "invalidated queries");

        if let Ok(runtime) = Handle::try_current() {
            let mut spawned = Vec::with_capacity(refetch.len());
            for (key, fetcher, policy) in refetch {
                let cache = self.clone();
                let task_key = key.clone();
                let task = runtime.spawn(async move {
                    let _ = cache.fetch(&task_key, fetcher, policy).await;
                });
                spawned.push((key, task.abort_handle()));
            }
            let mut entries = self.lock();
            for (key, handle) in spawned {
                match entries.get_mut(&key) {
                    Some(entry) if entry.observers > 0 => entry.track_background(handle),
                    _ => handle.abort(),
                }
            }
        }
        count
    }

    /// Register interest in `key`. The entry is not evicted while the
    /// returned guard is alive.
    pub fn observe(&self, key: &QueryKey) -> Observer {
        let now = Instant::now();
        let mut entries = self.lock();
        self.sweep(&mut entries, now);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now));
        entry.observers += 1;
        entry.last_active = now;
        Observer {
            cache: self.clone(),
            key: key.clone(),
        }
    }

    pub fn get_data(&self, key: &QueryKey) -> Option<Value> {
        self.lock().get(key).and_then(|entry| entry.data.clone())
    }

    /// Store `value` for `key` as freshly fetched.
    pub fn set_data(&self, key: &QueryKey, value: Value) {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now));
        entry.data = Some(value);
        entry.error = None;
        entry.updated_at = Some(now);
        entry.invalidated = false;
        entry.last_active = now;
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        self.lock().get(key).map(|entry| EntrySnapshot {
            data: entry.data.clone(),
            error: entry.error.clone(),
            updated_at: entry.updated_at,
            is_invalidated: entry.invalidated,
            is_fetching: entry.in_flight.is_some(),
            observers: entry.observers,
        })
    }

    /// Drop idle entries now. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        self.sweep(&mut entries, Instant::now());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self, entries: &mut HashMap<QueryKey, Entry>, now: Instant) {
        let gc_time = self.inner.config.gc_time;
        entries.retain(|key, entry| {
            let keep = entry.observers > 0
                || entry.in_flight.is_some()
                || now.saturating_duration_since(entry.last_active) < gc_time;
            if !keep {
                debug!(%key, "evicting idle query");
            }
            keep
        });
    }

    fn join_or_start(
        &self,
        entry: &mut Entry,
        fetcher: &Fetcher,
        policy: FetchPolicy,
    ) -> (u64, SharedFetch) {
        match entry.in_flight.as_mut() {
            Some(in_flight) => {
                in_flight.waiters += 1;
                (in_flight.id, in_flight.future.clone())
            }
            None => self.start(entry, fetcher, policy),
        }
    }

    fn start(&self, entry: &mut Entry, fetcher: &Fetcher, policy: FetchPolicy) -> (u64, SharedFetch) {
        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let future = fetch_with_retry(fetcher.clone(), policy.retry, self.inner.config.retry_delay)
            .boxed()
            .shared();
        entry.in_flight = Some(InFlight {
            id,
            future: future.clone(),
            waiters: 1,
        });
        (id, future)
    }

    async fn wait(&self, key: QueryKey, id: u64, future: SharedFetch) -> FetchResult {
        let mut waiter = Waiter {
            cache: self,
            key,
            id,
            settled: false,
        };
        let result = future.await;
        waiter.settle(&result);
        result
    }
}

async fn fetch_with_retry(fetcher: Fetcher, retry: u32, delay: Duration) -> FetchResult {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Err(err) if err.is_retryable() && attempt < retry => {
                attempt += 1;
                warn!(attempt, error = %err, "read failed, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// One reader's stake in an in-flight fetch.
struct Waiter<'a> {
    cache: &'a QueryCache,
    key: QueryKey,
    id: u64,
    settled: bool,
}

impl Waiter<'_> {
    fn settle(&mut self, result: &FetchResult) {
        self.settled = true;
        let mut entries = self.cache.lock();
        let Some(entry) = entries.get_mut(&self.key) else {
            return;
        };
        if entry.in_flight.as_ref().map(|f| f.id) != Some(self.id) {
            return;
        }
        let now = Instant::now();
        entry.in_flight = None;
        entry.last_active = now;
        match result {
            Ok(value) => {
                entry.data = Some(value.clone());
                entry.error = None;
                entry.updated_at = Some(now);
                entry.invalidated = false;
            }
            Err(err) => entry.error = Some(err.clone()),
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut entries = self.cache.lock();
        let Some(entry) = entries.get_mut(&self.key) else {
            return;
        };
        let abandoned = match entry.in_flight.as_mut() {
            Some(in_flight) if in_flight.id == self.id => {
                in_flight.waiters = in_flight.waiters.saturating_sub(1);
                in_flight.waiters == 0
            }
            _ => false,
        };
        if abandoned {
            debug!(key = %self.key, "all readers gone, abandoning fetch");
            entry.in_flight = None;
        }
    }
}

/// Keeps an entry alive and eligible for refetch on invalidation.
pub struct Observer {
    cache: QueryCache,
    key: QueryKey,
}

impl Drop for Observer {
    fn drop(&mut self) {
        let mut entries = self.cache.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_active = Instant::now();
            if entry.observers == 0 && !entry.background.is_empty() {
                debug!(key = %self.key, "last observer gone, aborting background refetch");
                for handle in entry.background.drain(..) {
                    handle.abort();
                }
            }
        }
    }
}
