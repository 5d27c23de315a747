//! Secret retrieval with ttl memoization.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::BqGcsResult;

/// Version alias resolving to the newest enabled secret version.
pub const LATEST_VERSION: &str = "latest";

/// Store holding named, versioned secrets.
pub trait SecretStore: Send + Sync {
    /// Fetches one version of a secret. Every call is a round-trip to the store.
    fn access_secret(
        &self,
        name: &str,
        project: &str,
        version: &str,
    ) -> impl Future<Output = BqGcsResult<SecretString>> + Send;
}

/// Secret value memoized by [`SecretCache`].
#[derive(Debug, Clone)]
pub struct CachedSecret {
    pub value: SecretString,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CachedSecret {
    /// Returns `true` while the value may still be served from memory.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Lazily fetches secrets and memoizes them for a fixed ttl.
///
/// Concurrent readers are serialized on the cache lock, so a stale or missing entry is
/// fetched once.
#[derive(Debug)]
pub struct SecretCache<S, C = SystemClock> {
    store: S,
    clock: C,
    project: String,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedSecret>>,
}

impl<S> SecretCache<S, SystemClock>
where
    S: SecretStore,
{
    /// Creates a cache reading secrets of `project` and keeping them for `ttl`.
    pub fn new(store: S, project: String, ttl: Duration) -> Self {
        Self::with_clock(store, project, ttl, SystemClock)
    }
}

impl<S, C> SecretCache<S, C>
where
    S: SecretStore,
    C: Clock,
{
    /// Creates a cache measuring time with `clock`.
    pub fn with_clock(store: S, project: String, ttl: Duration, clock: C) -> Self {
        Self {
            store,
            clock,
            project,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches a secret version without memoization.
    pub async fn get_secret(
        &self,
        name: &str,
        project: &str,
        version: &str,
    ) -> BqGcsResult<SecretString> {
        debug!(secret = name, project, version, "fetching secret");

        self.store.access_secret(name, project, version).await
    }

    /// Returns the latest version of a secret of the configured project.
    ///
    /// The first call fetches the value. Later calls within the ttl return the memoized value,
    /// and the first call after the ttl fetches it again.
    pub async fn cached_secret(&self, name: &str) -> BqGcsResult<SecretString> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();

        if let Some(entry) = entries.get(name)
            && entry.is_fresh(now)
        {
            return Ok(entry.value.clone());
        }

        let value = self.get_secret(name, &self.project, LATEST_VERSION).await?;
        entries.insert(
            name.to_string(),
            CachedSecret {
                value: value.clone(),
                fetched_at: self.clock.now(),
                ttl: self.ttl,
            },
        );

        Ok(value)
    }
}
