//! Normalized image records

use chrono::{DateTime, Utc};
use registry_driver::ImageDetail;
use serde::{Deserialize, Serialize};

/// One image in a repository, normalized for ranking and pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Repository the image lives in.
    pub repository_name: String,

    /// First tag reported for the image, or empty when untagged.
    pub image_tag: String,

    /// Content digest, the identity of the image within its repository.
    pub image_digest: String,

    /// Size of the image in bytes.
    pub image_size: u64,

    /// When the image was pushed.
    pub image_pushed_at: DateTime<Utc>,

    /// When the image was last pulled, or when it was pushed if it never was.
    pub last_pull_date: DateTime<Utc>,
}

impl ImageRecord {
    /// Normalize a registry image detail.
    ///
    /// An image the registry never saw pulled counts as touched at push time,
    /// the same way registry lifecycle policies age it.
    pub fn from_detail(repository: &str, detail: ImageDetail) -> Self {
        let last_pull_date = detail.last_pulled_at.unwrap_or(detail.pushed_at);
        let image_tag = detail.tags.into_iter().next().unwrap_or_default();

        Self {
            repository_name: repository.to_owned(),
            image_tag,
            image_digest: detail.digest,
            image_size: detail.size,
            image_pushed_at: detail.pushed_at,
            last_pull_date,
        }
    }
}
