//! # Registry inventory
//!
//! Inventory, statistics and lifecycle pruning for a container image registry,
//! on top of any [`Driver`].
//!
//! The [`Inventory`] ties the pieces together:
//!
//! - [`collect`] drains cursor-paginated listings,
//! - [`fetch`] normalizes a repository's images into [`ImageRecord`]s,
//! - [`rank`] orders them by recency or size,
//! - [`stats`] aggregates registry-wide totals, cached by [`cache`],
//! - [`delete`] selects expired images and deletes them in batches.
//!
//! ```no_run
//! use inventory::{Inventory, MemoryRegistry};
//!
//! # async fn example() -> Result<(), inventory::InventoryError> {
//! let inventory = Inventory::new(MemoryRegistry::new());
//! let largest = inventory.largest("team/api", Some(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

pub mod cache;
pub mod collect;
pub mod delete;
mod error;
pub mod fetch;
mod image;
pub(crate) mod memory;
pub mod rank;
pub mod stats;

#[cfg(feature = "ecr")]
pub(crate) mod ecr;

#[cfg(feature = "ecr")]
#[doc(inline)]
pub use ecr::EcrDriver;

#[doc(inline)]
pub use memory::{Calls, MemoryRegistry};

pub use cache::{StatsCache, DEFAULT_STATS_TTL};
pub use delete::DeletionOutcome;
pub use error::{InventoryError, InventoryResult};
pub use image::ImageRecord;
pub use stats::{GlobalStats, RepositorySummary};

#[doc(inline)]
pub use registry_driver::{Driver, DriverError, DriverErrorKind, ImageDetail};

/// Repositories fetched at once while aggregating global stats.
pub const DEFAULT_CONCURRENCY: usize = 4;

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// Registry inventory operations over a shared driver.
///
/// Cloning is cheap, and clones share the driver and the stats cache.
#[derive(Debug, Clone)]
pub struct Inventory {
    driver: ArcDriver,
    stats: Arc<StatsCache>,
    concurrency: usize,
}

impl<D> From<D> for Inventory
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Inventory::new(value)
    }
}

impl Inventory {
    /// Create an inventory with the default stats lifetime and concurrency.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Create an inventory over an already shared driver.
    pub fn from_arc(driver: Arc<dyn Driver + Send + Sync>) -> Self {
        Self {
            driver,
            stats: Arc::new(StatsCache::new(DEFAULT_STATS_TTL)),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set how long global stats stay cached. Drops anything already cached.
    pub fn with_stats_ttl(mut self, lifetime: Duration) -> Self {
        self.stats = Arc::new(StatsCache::new(lifetime));
        self
    }

    /// Set how many repositories are fetched at once for global stats.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Name of the underlying driver.
    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    /// The cache holding global stats.
    pub fn stats_cache(&self) -> &StatsCache {
        &self.stats
    }

    /// Every repository name in the registry.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn repositories(&self) -> InventoryResult<Vec<String>> {
        let repositories = collect::collect_all(collect::repositories(&*self.driver)).await?;
        tracing::debug!(count = repositories.len(), "Listed repositories");
        Ok(repositories)
    }

    /// Registry-wide statistics, recomputed once the cached copy expires.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn global_stats(&self) -> InventoryResult<GlobalStats> {
        self.stats
            .try_get(|| stats::aggregate(&*self.driver, self.concurrency))
            .await
    }

    /// Every image in a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn images(&self, repository: &str) -> InventoryResult<Vec<ImageRecord>> {
        require_repository(repository)?;
        fetch::fetch_images(&*self.driver, repository).await
    }

    /// Images in a repository, most recently pulled first.
    pub async fn most_recent(
        &self,
        repository: &str,
        limit: Option<usize>,
    ) -> InventoryResult<Vec<ImageRecord>> {
        let images = self.images(repository).await?;
        Ok(rank::by_recency(&images, limit))
    }

    /// Images in a repository, largest first.
    pub async fn largest(
        &self,
        repository: &str,
        limit: Option<usize>,
    ) -> InventoryResult<Vec<ImageRecord>> {
        let images = self.images(repository).await?;
        Ok(rank::by_size(&images, limit))
    }

    /// Images in a repository which have not been pulled for more than `days` days.
    ///
    /// Nothing is deleted. The result is what [`Inventory::delete_by_age`]
    /// would remove right now.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn expired(&self, repository: &str, days: i64) -> InventoryResult<Vec<ImageRecord>> {
        require_repository(repository)?;
        let now = Utc::now();
        delete::cutoff(days, now)?;

        let images = fetch::fetch_images(&*self.driver, repository).await?;
        let expired = delete::select_expired(&images, days, now)?;
        tracing::info!(
            "Filtered {} images by date criteria (older than {days} days)",
            expired.len()
        );
        Ok(expired)
    }

    /// Delete specific images from a repository.
    #[tracing::instrument(skip(self, digests), fields(driver = self.driver.name(), count = digests.len()))]
    pub async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> InventoryResult<DeletionOutcome> {
        if repository.is_empty() || digests.is_empty() {
            return Err(InventoryError::invalid(
                "repositoryName and imageDigests are required",
            ));
        }

        Ok(delete::delete_batches(&*self.driver, repository, digests).await)
    }

    /// Delete images from a repository by age.
    ///
    /// When `digests` is non-empty those images are deleted as given, which
    /// lets a caller confirm a preview from [`Inventory::expired`]. Otherwise
    /// `days` must be positive, and every image not pulled for more than
    /// `days` days is deleted. Returns `None` when no image is old enough.
    #[tracing::instrument(skip(self, digests), fields(driver = self.driver.name()))]
    pub async fn delete_by_age(
        &self,
        repository: &str,
        days: i64,
        digests: &[String],
    ) -> InventoryResult<Option<DeletionOutcome>> {
        require_repository(repository)?;

        if !digests.is_empty() {
            tracing::info!("Deleting {} specific images provided in request", digests.len());
            return Ok(Some(delete::delete_batches(&*self.driver, repository, digests).await));
        }

        if days <= 0 {
            return Err(InventoryError::invalid(
                "daysOld (> 0) is required when imageDigests is not provided",
            ));
        }

        let selected: Vec<String> = self
            .expired(repository, days)
            .await?
            .into_iter()
            .map(|image| image.image_digest)
            .collect();

        if selected.is_empty() {
            return Ok(None);
        }
        Ok(Some(delete::delete_batches(&*self.driver, repository, &selected).await))
    }
}

fn require_repository(repository: &str) -> InventoryResult<()> {
    if repository.is_empty() {
        return Err(InventoryError::invalid("repositoryName is required"));
    }
    Ok(())
}
