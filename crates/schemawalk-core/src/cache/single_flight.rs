//! Single-flight memoization of asynchronous loads.
//!
//! # Overview
//!
//! [`SingleFlightCache`] maps a key to the shared outcome of one factory
//! call. The first request for a key invokes the factory; every request,
//! concurrent or later, awaits that same computation and observes the same
//! value or the same error.
//!
//! # Concurrency
//!
//! - The store is a `DashMap`. The shared future is built inside
//!   `entry().or_insert_with`, which runs under the key's shard lock, so two
//!   racing requests cannot both call the factory.
//! - The shard guard is released before awaiting. Waiting happens on a
//!   cloned `Shared` handle, so a slow load for one key never blocks another.
//! - Failures are cached like values. There is no retry and no expiry; the
//!   owner may clear the whole store.
//!
//! # Cancellation
//!
//! Each caller passes a [`CancellationToken`]. Cancelling it detaches that
//! caller's wait with [`CacheError::Cancelled`]; the computation carries on
//! for everyone else. The factory receives the first caller's token and may
//! observe it cooperatively.

#![allow(clippy::module_name_repetitions)]

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture, Either, FutureExt, Shared};
use tracing::{debug, instrument};

use super::cancel::CancellationToken;
use crate::error::ErrorCode;

/// What a factory returns.
pub type LoadFuture<V> = BoxFuture<'static, anyhow::Result<V>>;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

type Factory<K, V, C> = dyn Fn(K, C, CancellationToken) -> LoadFuture<V> + Send + Sync;

/// Failure observed by a cache caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The factory failed. Every caller for the key sees this same error.
    #[error("load failed: {0:#}")]
    Load(Arc<anyhow::Error>),

    /// This caller's token was cancelled before the load finished.
    #[error("wait cancelled")]
    Cancelled,
}

impl CacheError {
    /// Stable error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Load(_) => ErrorCode::LoadFailed,
            Self::Cancelled => ErrorCode::LoadCancelled,
        }
    }
}

/// Per-key memoized asynchronous computation.
///
/// `K` is the key, `V` the cached value, and `C` a per-request context handed
/// to the factory on the first request for a key and dropped otherwise.
pub struct SingleFlightCache<K, V, C> {
    entries: DashMap<K, SharedLoad<V>>,
    factory: Box<Factory<K, V, C>>,
}

impl<K, V, C> fmt::Debug for SingleFlightCache<K, V, C>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<K, V, C> SingleFlightCache<K, V, C>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache around `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(K, C, CancellationToken) -> LoadFuture<V> + Send + Sync + 'static,
    {
        Self {
            entries: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Return the value for `key`, running the factory only if no request
    /// for `key` has been made before.
    ///
    /// A caller whose token is already cancelled returns immediately and
    /// does not start a load.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Load`] if the (single) factory call failed.
    /// - [`CacheError::Cancelled`] if `cancel` fired before the outcome was
    ///   ready.
    #[instrument(skip_all, fields(key = ?key))]
    pub async fn get_by_key(
        &self,
        key: K,
        context: C,
        cancel: &CancellationToken,
    ) -> Result<V, CacheError> {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let load = self.shared_load(key, context, cancel);

        match future::select(load, cancel.cancelled()).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), _)) => {
                debug!("caller detached from in-flight load");
                Err(CacheError::Cancelled)
            }
        }
    }

    /// Look up or create the shared load for `key`. The shard guard is
    /// dropped before returning.
    fn shared_load(&self, key: K, context: C, cancel: &CancellationToken) -> SharedLoad<V> {
        let mut started = false;
        let load = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                started = true;
                (self.factory)(key, context, cancel.clone())
                    .map(|outcome| outcome.map_err(|err| CacheError::Load(Arc::new(err))))
                    .boxed()
                    .shared()
            })
            .value()
            .clone();

        if started {
            debug!("started load");
        } else {
            debug!("joined existing load");
        }
        load
    }

    /// Return `true` if a load for `key` has been requested.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys with a load, finished or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. In-flight loads keep running for callers already
    /// waiting on them; new requests start fresh loads.
    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}
