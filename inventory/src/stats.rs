//! Registry-wide statistics

use futures::{future, stream, StreamExt as _};
use registry_driver::Driver;
use serde::{Deserialize, Serialize};

use crate::collect;
use crate::error::InventoryResult;
use crate::fetch::fetch_images;

const PROGRESS_INTERVAL: usize = 50;

/// Size and image count of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    /// Repository name.
    pub name: String,

    /// Total bytes across the repository's images.
    pub size: u64,

    /// Number of images in the repository.
    pub image_count: usize,
}

/// Totals across every repository in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    /// Repositories enumerated, including any that could not be fetched.
    pub total_repositories: usize,

    /// Images across all fetched repositories.
    pub total_images: usize,

    /// Bytes across all fetched repositories.
    pub total_size: u64,

    /// Repositories skipped because their images could not be fetched.
    pub failed_repositories: usize,

    /// Every fetched repository, largest first.
    pub top_repositories_by_size: Vec<RepositorySummary>,
}

#[derive(Debug, Default)]
struct Tally {
    images: usize,
    size: u64,
    failed: usize,
    repositories: Vec<RepositorySummary>,
}

impl Tally {
    fn record(mut self, outcome: InventoryResult<RepositorySummary>, total: usize) -> Self {
        match outcome {
            Ok(summary) => {
                self.images += summary.image_count;
                self.size += summary.size;
                self.repositories.push(summary);

                let processed = self.repositories.len();
                if processed % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        "Processed {processed}/{total} repositories, {} images so far",
                        self.images
                    );
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Skipping repository in global stats");
                self.failed += 1;
            }
        }
        self
    }

    fn finish(mut self, total: usize) -> GlobalStats {
        self.repositories
            .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));

        GlobalStats {
            total_repositories: total,
            total_images: self.images,
            total_size: self.size,
            failed_repositories: self.failed,
            top_repositories_by_size: self.repositories,
        }
    }
}

async fn summarize<D>(driver: &D, repository: String) -> InventoryResult<RepositorySummary>
where
    D: Driver + Send + Sync + ?Sized,
{
    let images = fetch_images(driver, &repository).await?;
    Ok(RepositorySummary {
        size: images.iter().map(|image| image.image_size).sum(),
        image_count: images.len(),
        name: repository,
    })
}

/// Compute registry-wide statistics.
///
/// Failing to enumerate repositories fails the whole computation. A
/// repository whose images cannot be fetched is logged and left out of the
/// totals and the summary list, but still counts towards
/// [`GlobalStats::total_repositories`].
///
/// Up to `concurrency` repositories are fetched at once. Each is fetched once.
#[tracing::instrument(skip(driver), fields(driver = driver.name()))]
pub async fn aggregate<D>(driver: &D, concurrency: usize) -> InventoryResult<GlobalStats>
where
    D: Driver + Send + Sync + ?Sized,
{
    tracing::info!("Calculating fresh global stats");

    let repositories = collect::collect_all(collect::repositories(driver)).await?;
    let total = repositories.len();

    let tally = stream::iter(repositories)
        .map(|repository| summarize(driver, repository))
        .buffer_unordered(concurrency.max(1))
        .fold(Tally::default(), |tally, outcome| {
            future::ready(tally.record(outcome, total))
        })
        .await;

    let stats = tally.finish(total);
    tracing::info!(
        processed = stats.top_repositories_by_size.len(),
        failed = stats.failed_repositories,
        images = stats.total_images,
        size = stats.total_size,
        "Global stats calculation complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use registry_driver::ImageDetail;

    use super::*;
    use crate::error::InventoryError;
    use crate::memory::MemoryRegistry;

    fn image(digest: &str, size: u64) -> ImageDetail {
        ImageDetail {
            digest: digest.into(),
            size,
            pushed_at: Utc::now(),
            tags: Vec::new(),
            last_pulled_at: None,
        }
    }

    fn registry() -> MemoryRegistry {
        let registry = MemoryRegistry::with_page_size(2);
        registry.push("alpha", image("sha256:a1", 10));
        registry.push("alpha", image("sha256:a2", 20));
        registry.push("beta", image("sha256:b1", 500));
        registry.push("gamma", image("sha256:g1", 30));
        registry.push("gamma", image("sha256:g2", 30));
        registry.push("gamma", image("sha256:g3", 30));
        registry.create_repository("empty");
        registry
    }

    #[tokio::test]
    async fn totals_and_ordering() {
        let stats = aggregate(&registry(), 1).await.unwrap();

        assert_eq!(stats.total_repositories, 4);
        assert_eq!(stats.total_images, 6);
        assert_eq!(stats.total_size, 620);
        assert_eq!(stats.failed_repositories, 0);

        let names: Vec<_> = stats
            .top_repositories_by_size
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, ["beta", "gamma", "alpha", "empty"]);
        assert_eq!(stats.top_repositories_by_size[1].image_count, 3);
    }

    #[tokio::test]
    async fn concurrency_does_not_change_totals() {
        let sequential = aggregate(&registry(), 1).await.unwrap();
        let concurrent = aggregate(&registry(), 8).await.unwrap();
        assert_eq!(sequential, concurrent);
    }

    fn summary(name: &str, size: u64, image_count: usize) -> InventoryResult<RepositorySummary> {
        Ok(RepositorySummary {
            name: name.into(),
            size,
            image_count,
        })
    }

    fn tally(outcomes: Vec<InventoryResult<RepositorySummary>>) -> GlobalStats {
        let total = outcomes.len();
        outcomes
            .into_iter()
            .fold(Tally::default(), |tally, outcome| tally.record(outcome, total))
            .finish(total)
    }

    #[test]
    fn completion_order_does_not_change_stats() {
        let outcomes = || {
            vec![
                summary("alpha", 30, 2),
                summary("beta", 500, 1),
                Err(InventoryError::invalid("listing failed")),
                summary("gamma", 90, 3),
                summary("delta", 30, 4),
            ]
        };

        let forward = tally(outcomes());

        let mut reversed = outcomes();
        reversed.reverse();
        let reversed = tally(reversed);

        let mut rotated = outcomes();
        rotated.rotate_left(2);
        let rotated = tally(rotated);

        assert_eq!(forward.total_images, 10);
        assert_eq!(forward.total_size, 650);
        assert_eq!(forward.failed_repositories, 1);
        let names: Vec<_> = forward
            .top_repositories_by_size
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, ["beta", "gamma", "alpha", "delta"]);

        assert_eq!(forward, reversed);
        assert_eq!(forward, rotated);
    }

    #[tokio::test]
    async fn failed_repository_is_counted_but_excluded() {
        let registry = registry();
        registry.fail_listing("beta");

        let stats = aggregate(&registry, 2).await.unwrap();

        assert_eq!(stats.total_repositories, 4);
        assert_eq!(stats.failed_repositories, 1);
        assert_eq!(stats.total_images, 5);
        assert_eq!(stats.total_size, 120);
        assert!(stats
            .top_repositories_by_size
            .iter()
            .all(|summary| summary.name != "beta"));
    }

    #[tokio::test]
    async fn repository_listing_failure_is_fatal() {
        let registry = registry();
        registry.fail_repository_listing();
        assert!(aggregate(&registry, 1).await.is_err());
    }

    #[tokio::test]
    async fn each_repository_fetched_once() {
        let registry = registry();
        aggregate(&registry, 4).await.unwrap();
        // alpha, beta, empty take one page each and gamma takes two
        assert_eq!(registry.calls().list_images, 5);
    }
}
