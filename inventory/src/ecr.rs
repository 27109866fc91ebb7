//! Amazon ECR driver

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ecr::types::ImageIdentifier;
use aws_sdk_ecr::Client;
use chrono::{DateTime, Utc};
use registry_driver::{
    BatchDelete, DeleteFailure, Driver, DriverError, DriverErrorKind, ImageDetail, Page,
};

const ENGINE: &str = "ecr";

/// Largest page the ECR describe APIs will serve.
const MAX_PAGE_SIZE: i32 = 1000;

/// Registry driver backed by the Amazon ECR API.
#[derive(Debug, Clone)]
pub struct EcrDriver {
    client: Client,
    page_size: i32,
}

impl EcrDriver {
    /// Wrap an existing ECR client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            page_size: 100,
        }
    }

    /// Load AWS configuration from the environment and connect to `region`.
    #[tracing::instrument]
    pub async fn from_region(region: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;
        Self::new(Client::new(&config))
    }

    /// Request `page_size` items per listing call, clamped to what ECR accepts.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = i32::try_from(page_size)
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        self
    }
}

fn classify<E, R>(error: &SdkError<E, R>) -> DriverErrorKind
where
    E: ProvideErrorMetadata,
{
    if matches!(
        error,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    ) {
        return DriverErrorKind::ServiceUnavailable;
    }

    match error.code() {
        Some("RepositoryNotFoundException" | "ImageNotFoundException") => DriverErrorKind::NotFound,
        Some("AccessDeniedException") => DriverErrorKind::PermissionDenied,
        Some("ThrottlingException") => DriverErrorKind::Throttled,
        Some("ServerException") => DriverErrorKind::ServiceUnavailable,
        Some("InvalidParameterException" | "LimitExceededException") => {
            DriverErrorKind::InvalidRequest
        }
        _ => DriverErrorKind::Other,
    }
}

fn sdk_error<E, R>(error: SdkError<E, R>, repository: Option<&str>, context: &str) -> DriverError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = classify(&error);
    let builder = DriverError::builder(ENGINE, kind, DisplayErrorContext(&error).to_string())
        .context(context);
    match repository {
        Some(repository) => builder.repository(repository).build(),
        None => builder.build(),
    }
}

fn timestamp(value: &aws_sdk_ecr::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

fn missing(repository: &str, field: &str) -> DriverError {
    DriverError::builder(
        ENGINE,
        DriverErrorKind::Other,
        format!("image detail is missing {field}"),
    )
    .repository(repository)
    .context("describe images")
    .build()
}

fn image_detail(
    repository: &str,
    detail: &aws_sdk_ecr::types::ImageDetail,
) -> Result<ImageDetail, DriverError> {
    let digest = detail
        .image_digest()
        .ok_or_else(|| missing(repository, "a digest"))?;
    let pushed_at = detail
        .image_pushed_at()
        .and_then(timestamp)
        .ok_or_else(|| missing(repository, "a push time"))?;

    Ok(ImageDetail {
        digest: digest.to_owned(),
        size: detail
            .image_size_in_bytes()
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or_default(),
        pushed_at,
        tags: detail.image_tags().to_vec(),
        last_pulled_at: detail.last_recorded_pull_time().and_then(timestamp),
    })
}

#[async_trait::async_trait]
impl Driver for EcrDriver {
    fn name(&self) -> &'static str {
        ENGINE
    }

    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self, cursor: Option<&str>) -> Result<Page<String>, DriverError> {
        let output = self
            .client
            .describe_repositories()
            .max_results(self.page_size)
            .set_next_token(cursor.map(str::to_owned))
            .send()
            .await
            .map_err(|error| sdk_error(error, None, "describe repositories"))?;

        let names = output
            .repositories()
            .iter()
            .filter_map(|repository| repository.repository_name())
            .map(str::to_owned)
            .collect();
        Ok(Page::new(names, output.next_token().map(str::to_owned)))
    }

    #[tracing::instrument(skip(self))]
    async fn list_images(
        &self,
        repository: &str,
        cursor: Option<&str>,
    ) -> Result<Page<ImageDetail>, DriverError> {
        let output = self
            .client
            .describe_images()
            .repository_name(repository)
            .max_results(self.page_size)
            .set_next_token(cursor.map(str::to_owned))
            .send()
            .await
            .map_err(|error| sdk_error(error, Some(repository), "describe images"))?;

        let images = output
            .image_details()
            .iter()
            .map(|detail| image_detail(repository, detail))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(images, output.next_token().map(str::to_owned)))
    }

    #[tracing::instrument(skip(self, digests), fields(count = digests.len()))]
    async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDelete, DriverError> {
        let ids = digests
            .iter()
            .map(|digest| ImageIdentifier::builder().image_digest(digest).build())
            .collect();

        let output = self
            .client
            .batch_delete_image()
            .repository_name(repository)
            .set_image_ids(Some(ids))
            .send()
            .await
            .map_err(|error| sdk_error(error, Some(repository), "batch delete image"))?;

        let deleted = output
            .image_ids()
            .iter()
            .filter_map(|id| id.image_digest())
            .map(str::to_owned)
            .collect();

        let failures = output
            .failures()
            .iter()
            .map(|failure| DeleteFailure {
                digest: failure
                    .image_id()
                    .and_then(|id| id.image_digest())
                    .unwrap_or_default()
                    .to_owned(),
                reason: failure.failure_reason().unwrap_or_default().to_owned(),
            })
            .collect();

        Ok(BatchDelete { deleted, failures })
    }
}
