//! # Registry drivers
//!
//! The narrow contract a container-image registry must satisfy so that its
//! contents can be inventoried and pruned: two cursor-paginated listings and
//! one capped bulk delete.

mod driver;
mod error;

pub use driver::BatchDelete;
pub use driver::DeleteFailure;
pub use driver::Driver;
pub use driver::ImageDetail;
pub use driver::Page;
pub use driver::MAX_DELETE_BATCH;
pub use error::{DriverError, DriverErrorBuilder, DriverErrorKind};
