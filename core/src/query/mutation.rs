//! Write bindings: one mutating call, then declared invalidations.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::warn;

use super::cache::QueryCache;
use super::key::QueryKey;
use crate::error::ApiError;

type MutateFn<I, T> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;
type InvalidatesFn<I> = Arc<dyn Fn(&I) -> Vec<QueryKey> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    Idle,
    Pending,
    Success(T),
    Error(ApiError),
}

/// A write operation with the cache keys it makes stale on success.
///
/// Writes are never retried. A failed write invalidates nothing, and a
/// write whose future is dropped before completion leaves the cache alone.
pub struct Mutation<I, T> {
    cache: QueryCache,
    mutate_fn: MutateFn<I, T>,
    invalidates: InvalidatesFn<I>,
    state: Mutex<MutationState<T>>,
}

impl<I, T: Clone> Mutation<I, T> {
    pub fn new<F, Fut, G>(cache: QueryCache, mutate_fn: F, invalidates: G) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        G: Fn(&I) -> Vec<QueryKey> + Send + Sync + 'static,
    {
        Self {
            cache,
            mutate_fn: Arc::new(move |input| mutate_fn(input).boxed()),
            invalidates: Arc::new(invalidates),
            state: Mutex::new(MutationState::Idle),
        }
    }

    pub async fn mutate(&self, input: I) -> Result<T, ApiError> {
        let targets = (self.invalidates)(&input);
        let mut pending = PendingGuard {
            state: &self.state,
            finished: false,
        };
        pending.set(MutationState::Pending);

        let result = (self.mutate_fn)(input).await;
        match &result {
            Ok(value) => {
                for key in &targets {
                    self.cache.invalidate(key);
                }
                pending.finish(MutationState::Success(value.clone()));
            }
            Err(err) => {
                warn!(error = %err, "write failed, nothing invalidated");
                pending.finish(MutationState::Error(err.clone()));
            }
        }
        result
    }

    pub fn state(&self) -> MutationState<T> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = MutationState::Idle;
    }
}

/// Returns the mutation to `Idle` if the caller stops waiting mid-flight.
struct PendingGuard<'a, T> {
    state: &'a Mutex<MutationState<T>>,
    finished: bool,
}

impl<T> PendingGuard<'_, T> {
    fn set(&self, state: MutationState<T>) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn finish(&mut self, state: MutationState<T>) {
        self.finished = true;
        self.set(state);
    }
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.set(MutationState::Idle);
        }
    }
}
