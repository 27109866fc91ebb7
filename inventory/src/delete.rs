//! Bulk deletion under the registry's per-call batch limit

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use registry_driver::Driver;

use crate::error::{InventoryError, InventoryResult};
use crate::image::ImageRecord;

/// Result of deleting a set of images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Images the registry confirmed as deleted.
    pub deleted: usize,

    /// One entry per failed batch call or per image the registry refused, in
    /// the order they were encountered.
    pub errors: Vec<String>,
}

impl DeletionOutcome {
    /// Whether anything went wrong.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Split `items` into consecutive chunks of at most `cap`, preserving order.
pub fn partition<T>(items: &[T], cap: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(cap.max(1))
}

/// Delete `digests` from `repository`, one bulk call per batch.
///
/// A failed call is recorded and the remaining batches still run. Images the
/// registry reports as failed are recorded individually and not counted as
/// deleted, even when the registry also lists them as deleted. No call is made
/// for an empty digest list.
#[tracing::instrument(skip(driver, digests), fields(driver = driver.name(), total = digests.len()))]
pub async fn delete_batches<D>(driver: &D, repository: &str, digests: &[String]) -> DeletionOutcome
where
    D: Driver + Send + Sync + ?Sized,
{
    let mut outcome = DeletionOutcome::default();
    let mut offset = 0;

    for batch in partition(digests, registry_driver::MAX_DELETE_BATCH) {
        let start = offset + 1;
        let end = offset + batch.len();
        offset = end;

        match driver.delete_images(repository, batch).await {
            Ok(result) => {
                let failed: HashSet<&str> =
                    result.failures.iter().map(|f| f.digest.as_str()).collect();
                let confirmed = result
                    .deleted
                    .iter()
                    .filter(|digest| !failed.contains(digest.as_str()))
                    .count();
                outcome.deleted += confirmed;
                for failure in &result.failures {
                    tracing::warn!(digest = %failure.digest, reason = %failure.reason, "Image not deleted");
                    outcome.errors.push(format!(
                        "Failed to delete image {}: {}",
                        failure.digest, failure.reason
                    ));
                }
                tracing::debug!(
                    "Deleted batch {start}-{end}: {} succeeded, {} failed (out of {} total)",
                    confirmed,
                    result.failures.len(),
                    batch.len()
                );
            }
            Err(error) => {
                tracing::error!(%error, "Failed to delete batch {start}-{end}");
                outcome
                    .errors
                    .push(format!("Failed to delete batch {start}-{end}: {error}"));
            }
        }
    }

    tracing::info!(
        deleted = outcome.deleted,
        errors = outcome.errors.len(),
        "Deletion complete"
    );
    outcome
}

/// The instant `days` days before `now`. `days` must be positive.
pub fn cutoff(days: i64, now: DateTime<Utc>) -> InventoryResult<DateTime<Utc>> {
    if days <= 0 {
        return Err(InventoryError::invalid("daysOld must be greater than 0"));
    }

    TimeDelta::try_days(days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| InventoryError::invalid(format!("daysOld is out of range: {days}")))
}

/// Images last pulled more than `days` days before `now`.
///
/// An image pulled exactly at the cutoff is kept.
pub fn select_expired(
    images: &[ImageRecord],
    days: i64,
    now: DateTime<Utc>,
) -> InventoryResult<Vec<ImageRecord>> {
    let cutoff = cutoff(days, now)?;
    Ok(images
        .iter()
        .filter(|image| image.last_pull_date < cutoff)
        .cloned()
        .collect())
}
