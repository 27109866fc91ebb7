//! A time-windowed cache for one expensive value

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::stats::GlobalStats;

/// How long global stats stay fresh by default.
pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Cache for registry-wide statistics.
pub type StatsCache = Cached<GlobalStats>;

#[derive(Debug, Default)]
enum InnerCache<T> {
    #[default]
    Empty,
    Cached {
        value: T,
        expires: Instant,
    },
}

impl<T> InnerCache<T> {
    fn fresh(&self, now: Instant) -> Option<&T> {
        match self {
            InnerCache::Cached { value, expires } if now < *expires => Some(value),
            _ => None,
        }
    }
}

/// A single cached value which expires a fixed lifetime after it was computed.
///
/// The value and its expiry are replaced together under one write lock, so
/// readers never see one without the other. Callers racing on a stale cache
/// each compute their own value; the last one to finish is kept.
pub struct Cached<T> {
    inner: RwLock<InnerCache<T>>,
    lifetime: Duration,
}

impl<T> fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("lifetime", &self.lifetime)
            .field("expires", &self.expires_at())
            .finish()
    }
}

impl<T> Cached<T> {
    /// Create an empty cache whose values live for `lifetime`.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            inner: RwLock::new(InnerCache::Empty),
            lifetime,
        }
    }

    /// When the cached value expires, if there is one.
    pub fn expires_at(&self) -> Option<Instant> {
        match &*self.inner.read() {
            InnerCache::Cached { expires, .. } => Some(*expires),
            InnerCache::Empty => None,
        }
    }

    /// Drop the cached value.
    pub fn clear(&self) {
        *self.inner.write() = InnerCache::Empty;
    }

    fn store(&self, value: T) -> Instant {
        let expires = Instant::now() + self.lifetime;
        *self.inner.write() = InnerCache::Cached { value, expires };
        expires
    }
}

impl<T> Cached<T>
where
    T: Clone,
{
    /// The cached value, if it is still fresh.
    pub fn get_fresh(&self) -> Option<T> {
        self.inner.read().fresh(Instant::now()).cloned()
    }

    /// Return the fresh cached value, or compute, cache and return a new one.
    ///
    /// Errors are returned to the caller and never cached; whatever was cached
    /// before stays in place.
    pub async fn try_get<F, Fut, E>(&self, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_fresh() {
            tracing::debug!(expires = ?self.expires_at(), "Returning cached value");
            return Ok(value);
        }

        let value = compute().await?;
        let expires = self.store(value.clone());
        tracing::info!(lifetime = ?self.lifetime, ?expires, "Cached fresh value");
        Ok(value)
    }
}
