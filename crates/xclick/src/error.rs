//! Error types for pool construction and driver adapters.

use std::time::Duration;

use thiserror::Error;

/// A boxed error as returned by driver and migration collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or constructing a pool.
///
/// Collaborator failures (open, ping, migrations, close) keep the original
/// error as their source and display its message unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The driver failed to open a connection.
    #[error("{0}")]
    Open(#[source] BoxError),

    /// The liveness check after opening failed.
    #[error("{0}")]
    Ping(#[source] BoxError),

    /// Applying a migration source failed.
    #[error("{source}")]
    Migration {
        /// Name of the migration source that failed.
        source_name: String,
        /// Error returned by the migrator.
        #[source]
        source: BoxError,
    },

    /// Migrations are enabled and sources were supplied, but no migrator.
    #[error("migrations are enabled but no migrator was configured")]
    MissingMigrator,

    /// Registering the stats collector failed.
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Closing the connection failed.
    #[error("{0}")]
    Close(#[source] BoxError),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// IO error while reading configuration material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pool construction did not finish within the configured deadline.
    #[error("pool construction timed out after {0:?}")]
    Timeout(Duration),
}

/// Category carried by a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DriverErrorKind {
    /// Network-layer failure (dial, reset, timeout).
    Network,
    /// The query produced no rows.
    NoRows,
    /// Anything else.
    Other,
}

/// Tagged error for driver adapters.
///
/// Adapters that return (or wrap) a `DriverError` let
/// [`classify`](crate::classify()) match on the tag instead of on message
/// text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl DriverError {
    /// Create an error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Network, message)
    }

    /// Create the "no rows" error.
    pub fn no_rows() -> Self {
        Self::new(DriverErrorKind::NoRows, crate::classify::NO_ROWS_MESSAGE)
    }

    /// Create an uncategorized error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error category.
    #[must_use]
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        let kind = if crate::classify::is_network_io(&err) {
            DriverErrorKind::Network
        } else {
            DriverErrorKind::Other
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}
