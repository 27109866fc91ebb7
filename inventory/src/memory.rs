use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;
use registry_driver::{
    BatchDelete, DeleteFailure, Driver, DriverError, DriverErrorKind, ImageDetail, Page,
    MAX_DELETE_BATCH,
};

const ENGINE: &str = "memory";
const DEFAULT_PAGE_SIZE: usize = 100;

/// Calls a [`MemoryRegistry`] has served, for asserting on remote traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    /// Pages of repository names served.
    pub list_repositories: usize,

    /// Pages of images served, across all repositories.
    pub list_images: usize,

    /// Every bulk delete call, with the digests it was given.
    pub delete_batches: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct Failures {
    repository_listing: bool,
    image_listing: HashSet<String>,
    delete_calls: HashSet<usize>,
    refused: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    repositories: BTreeMap<String, Vec<ImageDetail>>,
    failures: Failures,
    calls: Calls,
}

/// Registry driver that keeps repositories in memory.
///
/// Listings are paginated with integer offsets as cursors. Failures can be
/// scripted per repository, per delete call, or per digest.
#[derive(Debug)]
pub struct MemoryRegistry {
    page_size: usize,
    state: Mutex<State>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty registry which serves `page_size` items per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(State::default()),
        }
    }

    /// Create a registry holding the given repositories.
    pub fn with_repositories(repositories: BTreeMap<String, Vec<ImageDetail>>) -> Self {
        let registry = Self::new();
        registry.state.lock().repositories = repositories;
        registry
    }

    /// Create an empty repository.
    pub fn create_repository(&self, repository: &str) {
        self.state
            .lock()
            .repositories
            .entry(repository.to_owned())
            .or_default();
    }

    /// Push an image, creating the repository if needed.
    pub fn push(&self, repository: &str, image: ImageDetail) {
        self.state
            .lock()
            .repositories
            .entry(repository.to_owned())
            .or_default()
            .push(image);
    }

    /// Digests currently stored in a repository.
    pub fn digests(&self, repository: &str) -> Vec<String> {
        self.state
            .lock()
            .repositories
            .get(repository)
            .map(|images| images.iter().map(|image| image.digest.clone()).collect())
            .unwrap_or_default()
    }

    /// Fail every page of the repository listing.
    pub fn fail_repository_listing(&self) {
        self.state.lock().failures.repository_listing = true;
    }

    /// Fail every page of the image listing for one repository.
    pub fn fail_listing(&self, repository: &str) {
        self.state
            .lock()
            .failures
            .image_listing
            .insert(repository.to_owned());
    }

    /// Fail the `nth` bulk delete call (1-based) as a whole.
    pub fn fail_delete_call(&self, nth: usize) {
        self.state.lock().failures.delete_calls.insert(nth);
    }

    /// Refuse to delete one digest, reporting `reason` as an item failure.
    pub fn refuse(&self, digest: &str, reason: &str) {
        self.state
            .lock()
            .failures
            .refused
            .insert(digest.to_owned(), reason.to_owned());
    }

    /// Calls served so far.
    pub fn calls(&self) -> Calls {
        self.state.lock().calls.clone()
    }

    fn page<T: Clone>(&self, items: &[T], cursor: Option<&str>) -> Result<Page<T>, DriverError> {
        let start = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(DriverError::with(ENGINE, DriverErrorKind::InvalidRequest))?,
        };

        let end = (start + self.page_size).min(items.len());
        let slice = items.get(start..end).unwrap_or_default();
        let next = (end < items.len()).then(|| end.to_string());
        Ok(Page::new(slice.to_vec(), next))
    }
}

fn not_found(repository: &str, context: &str) -> DriverError {
    DriverError::builder(
        ENGINE,
        DriverErrorKind::NotFound,
        format!("repository {repository} does not exist"),
    )
    .repository(repository)
    .context(context)
    .build()
}

#[async_trait::async_trait]
impl Driver for MemoryRegistry {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn list_repositories(&self, cursor: Option<&str>) -> Result<Page<String>, DriverError> {
        let mut state = self.state.lock();
        state.calls.list_repositories += 1;

        if state.failures.repository_listing {
            return Err(DriverError::builder(
                ENGINE,
                DriverErrorKind::ServiceUnavailable,
                "repository listing unavailable",
            )
            .context("list repositories")
            .build());
        }

        let names: Vec<String> = state.repositories.keys().cloned().collect();
        self.page(&names, cursor)
    }

    async fn list_images(
        &self,
        repository: &str,
        cursor: Option<&str>,
    ) -> Result<Page<ImageDetail>, DriverError> {
        let mut state = self.state.lock();
        state.calls.list_images += 1;

        if state.failures.image_listing.contains(repository) {
            return Err(DriverError::builder(
                ENGINE,
                DriverErrorKind::Throttled,
                "rate exceeded",
            )
            .repository(repository)
            .context("list images")
            .build());
        }

        let images = state
            .repositories
            .get(repository)
            .ok_or_else(|| not_found(repository, "list images"))?;
        self.page(images, cursor)
    }

    async fn delete_images(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDelete, DriverError> {
        let mut state = self.state.lock();
        state.calls.delete_batches.push(digests.to_vec());
        let call = state.calls.delete_batches.len();

        if digests.len() > MAX_DELETE_BATCH {
            return Err(DriverError::builder(
                ENGINE,
                DriverErrorKind::InvalidRequest,
                format!(
                    "{} digests exceeds the limit of {MAX_DELETE_BATCH}",
                    digests.len()
                ),
            )
            .repository(repository)
            .build());
        }

        if state.failures.delete_calls.contains(&call) {
            return Err(DriverError::builder(
                ENGINE,
                DriverErrorKind::ServiceUnavailable,
                "connection reset",
            )
            .repository(repository)
            .context("delete images")
            .build());
        }

        let State {
            repositories,
            failures,
            ..
        } = &mut *state;

        let images = repositories
            .get_mut(repository)
            .ok_or_else(|| not_found(repository, "delete images"))?;

        let mut result = BatchDelete::default();
        for digest in digests {
            if let Some(reason) = failures.refused.get(digest) {
                result.failures.push(DeleteFailure {
                    digest: digest.clone(),
                    reason: reason.clone(),
                });
                continue;
            }

            match images.iter().position(|image| &image.digest == digest) {
                Some(index) => {
                    images.remove(index);
                    result.deleted.push(digest.clone());
                }
                None => result.failures.push(DeleteFailure {
                    digest: digest.clone(),
                    reason: "Requested image not found".into(),
                }),
            }
        }

        Ok(result)
    }
}
