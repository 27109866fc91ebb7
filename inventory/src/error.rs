//! Error types for inventory operations

use registry_driver::DriverError;

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Error types for inventory operations
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// A registry call failed
    #[error(transparent)]
    Upstream(#[from] DriverError),

    /// Collecting the images of one repository failed
    #[error("failed to describe images for repository {repository}: {source}")]
    Repository {
        /// Repository being collected
        repository: String,
        /// Underlying registry failure
        #[source]
        source: DriverError,
    },

    /// The request was rejected before contacting the registry
    #[error("{0}")]
    InvalidInput(String),
}

impl InventoryError {
    /// Wrap a registry failure with the repository it occurred in.
    pub fn repository(repository: impl Into<String>) -> impl FnOnce(DriverError) -> Self {
        let repository = repository.into();
        move |source| InventoryError::Repository { repository, source }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        InventoryError::InvalidInput(message.into())
    }

    /// Whether the caller supplied bad input, as opposed to an upstream failure.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, InventoryError::InvalidInput(_))
    }
}
