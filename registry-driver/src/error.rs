use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

/// Categorizes registry errors by their semantic meaning, independent of
/// the registry backend which produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The repository (or registry) does not exist.
    NotFound,

    /// The credentials in use do not allow this operation.
    PermissionDenied,

    /// The registry is rate limiting this client.
    ///
    /// **Retryable:** Yes, after backing off.
    Throttled,

    /// The registry is temporarily unavailable, or could not be reached.
    ///
    /// **Retryable:** Yes.
    ServiceUnavailable,

    /// The registry rejected the request as malformed.
    InvalidRequest,

    /// An unexpected or uncategorized error occurred.
    Other,
}

impl DriverErrorKind {
    /// Returns whether this error kind typically indicates a retryable condition.
    ///
    /// Advisory only: nothing in this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverErrorKind::Throttled | DriverErrorKind::ServiceUnavailable
        )
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverErrorKind::NotFound => write!(f, "not found"),
            DriverErrorKind::PermissionDenied => write!(f, "permission denied"),
            DriverErrorKind::Throttled => write!(f, "throttled"),
            DriverErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            DriverErrorKind::InvalidRequest => write!(f, "invalid request"),
            DriverErrorKind::Other => write!(f, "other error"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Captured backtrace, subject to `RUST_BACKTRACE`.
    backtrace: Backtrace,

    /// Span context at the point the error was created.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// An error returned by a registry driver.
///
/// Carries the semantic [`DriverErrorKind`], the engine which produced it,
/// the repository involved (when there is one), and the underlying error.
///
/// # Example
///
/// ```rust
/// use registry_driver::{DriverError, DriverErrorKind};
///
/// let error = DriverError::builder(
///     "memory",
///     DriverErrorKind::NotFound,
///     "repository does not exist",
/// )
///     .repository("team/api")
///     .context("list images")
///     .build();
///
/// assert_eq!(error.repository(), Some("team/api"));
/// ```
#[derive(Debug)]
pub struct DriverError {
    kind: DriverErrorKind,
    engine: &'static str,
    repository: Option<String>,
    context: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
    traces: Box<ErrorTrace>,
}

impl StdError for DriverError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl DriverError {
    /// Create a new driver error with the minimum required information.
    pub fn new<E>(engine: &'static str, kind: DriverErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            repository: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder, to attach a repository or context to the error.
    pub fn builder<E>(engine: &'static str, kind: DriverErrorKind, error: E) -> DriverErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        DriverErrorBuilder {
            kind,
            engine,
            source: error.into(),
            repository: None,
            context: None,
        }
    }

    /// Returns a boxed closure that creates a driver error from a downstream error.
    ///
    /// Useful with `.map_err()`.
    pub fn with<E>(
        engine: &'static str,
        kind: DriverErrorKind,
    ) -> Box<dyn FnOnce(E) -> DriverError + Send + Sync>
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Box::new(move |error: E| DriverError::new(engine, kind, error))
    }

    /// Returns the error kind.
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// Returns the registry engine name.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the repository, if available.
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns whether this error is likely retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registry error [{}] from {}", self.kind, self.engine)?;

        if let Some(repository) = &self.repository {
            write!(f, " (repository: {})", repository)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for a [`DriverError`] with optional context fields.
#[derive(Debug)]
pub struct DriverErrorBuilder {
    kind: DriverErrorKind,
    engine: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    repository: Option<String>,
    context: Option<String>,
}

impl DriverErrorBuilder {
    /// Set the repository name.
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the [`DriverError`].
    pub fn build(self) -> DriverError {
        DriverError {
            kind: self.kind,
            engine: self.engine,
            repository: self.repository,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}
