//! Fetching the full image inventory of a repository

use registry_driver::Driver;

use crate::collect;
use crate::error::{InventoryError, InventoryResult};
use crate::image::ImageRecord;

/// Collect and normalize every image in a repository.
///
/// A failed page aborts the fetch, and the error names the repository. Callers
/// choose whether that skips the repository or fails the request.
#[tracing::instrument(skip(driver), fields(driver = driver.name()))]
pub async fn fetch_images<D>(driver: &D, repository: &str) -> InventoryResult<Vec<ImageRecord>>
where
    D: Driver + Send + Sync + ?Sized,
{
    let details = collect::collect_all(collect::images(driver, repository))
        .await
        .map_err(InventoryError::repository(repository))?;

    tracing::debug!(images = details.len(), "Fetched repository images");

    Ok(details
        .into_iter()
        .map(|detail| ImageRecord::from_detail(repository, detail))
        .collect())
}
