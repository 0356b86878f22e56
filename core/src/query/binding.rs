//! Typed read bindings over the query cache.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::cache::{FetchPolicy, Fetcher, Observer, QueryCache};
use super::key::QueryKey;
use crate::error::ApiError;

/// Per-read overrides of the cache defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub enabled: bool,
    pub stale_time: Option<Duration>,
    pub retry: Option<u32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
            retry: None,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// What a caller observes for one read.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// The read is gated on a dependency that is not available yet.
    Disabled,
    Pending,
    Success(T),
    Error(ApiError),
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            QueryState::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending)
    }
}

/// Wrap an async JSON-producing call as a cache `Fetcher`.
pub fn fetcher<F, Fut>(call: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
{
    Arc::new(move || call().boxed())
}

/// Wrap an async call producing any serializable `T` as a cache `Fetcher`.
pub fn typed_fetcher<T, F, Fut>(call: F) -> Fetcher
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || {
        call()
            .map(|result| {
                result.and_then(|value| {
                    serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))
                })
            })
            .boxed()
    })
}

/// A read bound to one cache key.
///
/// While the binding is alive and enabled it counts as an observer of its
/// key: the entry is kept in memory and refetched when invalidated.
pub struct Query<T> {
    cache: QueryCache,
    key: QueryKey,
    fetcher: Fetcher,
    policy: FetchPolicy,
    enabled: bool,
    _observer: Option<Observer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Query<T> {
    pub fn new(cache: QueryCache, key: QueryKey, fetcher: Fetcher, options: QueryOptions) -> Self {
        let defaults = cache.default_policy();
        let policy = FetchPolicy {
            stale_time: options.stale_time.unwrap_or(defaults.stale_time),
            retry: options.retry.unwrap_or(defaults.retry),
        };
        let observer = options.enabled.then(|| cache.observe(&key));
        Self {
            cache,
            key,
            fetcher,
            policy,
            enabled: options.enabled,
            _observer: observer,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve the read through the cache. Disabled reads never fetch.
    pub async fn fetch(&self) -> QueryState<T> {
        if !self.enabled {
            return QueryState::Disabled;
        }
        match self
            .cache
            .fetch(&self.key, self.fetcher.clone(), self.policy)
            .await
        {
            Ok(value) => decode(value),
            Err(err) => QueryState::Error(err),
        }
    }

    /// Current state without fetching.
    pub fn state(&self) -> QueryState<T> {
        if !self.enabled {
            return QueryState::Disabled;
        }
        match self.cache.snapshot(&self.key) {
            Some(snapshot) => match (snapshot.error, snapshot.data) {
                (Some(err), _) => QueryState::Error(err),
                (None, Some(value)) => decode(value),
                (None, None) => QueryState::Pending,
            },
            None => QueryState::Pending,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> QueryState<T> {
    match serde_json::from_value(value) {
        Ok(data) => QueryState::Success(data),
        Err(err) => QueryState::Error(ApiError::Deserialization(err.to_string())),
    }
}
