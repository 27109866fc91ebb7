use std::{fmt, ops::Deref, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// The largest number of digests a registry accepts in one bulk delete call.
pub const MAX_DELETE_BATCH: usize = 100;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items returned on this page, in registry order.
    pub items: Vec<T>,

    /// Cursor for the following page. `None` marks the final page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// A page, with the cursor of the next page if there is one.
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    /// The final page of a listing.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Image metadata as reported by the registry.
///
/// This only provides the fields common to registries, drivers are free to
/// drop anything else the backend reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetail {
    /// Content digest, e.g. `sha256:...`.
    pub digest: String,

    /// Size of the image in bytes.
    pub size: u64,

    /// When the image was pushed.
    pub pushed_at: DateTime<Utc>,

    /// Tags pointing at this image, in registry order. May be empty.
    #[serde(default)]
    pub tags: Vec<String>,

    /// The last pull the registry recorded, if any.
    #[serde(default)]
    pub last_pulled_at: Option<DateTime<Utc>>,
}

/// A single digest the registry refused to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    /// Digest which was not deleted.
    pub digest: String,

    /// Reason given by the registry.
    pub reason: String,
}

/// Response to a bulk delete call which the registry accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDelete {
    /// Digests the registry confirmed as deleted.
    pub deleted: Vec<String>,

    /// Digests the registry reported as failed.
    pub failures: Vec<DeleteFailure>,
}

/// A registry driver, which provides listing and deletion against a backend.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// List one page of repository names.
    async fn list_repositories(&self, cursor: Option<&str>) -> Result<Page<String>, DriverError>;

    /// List one page of images in a repository.
    async fn list_images(
        &self,
        repository: &str,
        cursor: Option<&str>,
    ) -> Result<Page<ImageDetail>, DriverError>;

    /// Delete up to [`MAX_DELETE_BATCH`] images from a repository, by digest.
    ///
    /// A returned error means the whole call failed. Individual digests the
    /// registry refused are reported in [`BatchDelete::failures`].
    async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDelete, DriverError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn list_repositories(&self, cursor: Option<&str>) -> Result<Page<String>, DriverError> {
        self.deref().list_repositories(cursor).await
    }

    async fn list_images(
        &self,
        repository: &str,
        cursor: Option<&str>,
    ) -> Result<Page<ImageDetail>, DriverError> {
        self.deref().list_images(repository, cursor).await
    }

    async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDelete, DriverError> {
        self.deref().delete_images(repository, digests).await
    }
}

#[async_trait::async_trait]
impl<D> Driver for &D
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        (*self).name()
    }

    async fn list_repositories(&self, cursor: Option<&str>) -> Result<Page<String>, DriverError> {
        (*self).list_repositories(cursor).await
    }

    async fn list_images(
        &self,
        repository: &str,
        cursor: Option<&str>,
    ) -> Result<Page<ImageDetail>, DriverError> {
        (*self).list_images(repository, cursor).await
    }

    async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDelete, DriverError> {
        (*self).delete_images(repository, digests).await
    }
}
