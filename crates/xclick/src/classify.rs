//! Classification of errors returned by the underlying client.
//!
//! Classification is never applied automatically. Callers run it on errors
//! they get back from query paths and branch on [`ErrorKind`].

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::error::{DriverError, DriverErrorKind};

/// Message the client uses for an empty result set.
pub const NO_ROWS_MESSAGE: &str = "sql: no rows in result set";

/// Category of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network-layer failure.
    Connection,
    /// The query returned no rows.
    NoRows,
    /// Anything else.
    Other,
}

/// An error reduced to its category and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
}

impl ClassifiedError {
    /// Build a classification from a kind and the original error.
    pub fn new(kind: ErrorKind, err: &dyn StdError) -> Self {
        Self {
            kind,
            message: err.to_string(),
        }
    }

    /// Get the category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the original error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a network-layer failure.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        self.kind == ErrorKind::Connection
    }

    /// Whether this is the empty result set condition.
    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        self.kind == ErrorKind::NoRows
    }
}

/// Classify an optional error. `None` yields `None`.
pub fn classify(err: Option<&(dyn StdError + 'static)>) -> Option<ClassifiedError> {
    err.map(classify_error)
}

/// Classify the error side of a result. `Ok` yields `None`.
pub fn classify_result<T, E>(result: &Result<T, E>) -> Option<ClassifiedError>
where
    E: StdError + 'static,
{
    match result {
        Ok(_) => None,
        Err(err) => Some(classify_error(err)),
    }
}

/// Classify an error.
///
/// First match wins:
/// 1. a network-layer failure anywhere in the source chain is `Connection`;
/// 2. a [`DriverErrorKind::NoRows`] tag in the chain, or a top-level message
///    equal to [`NO_ROWS_MESSAGE`], is `NoRows`;
/// 3. everything else is `Other`.
pub fn classify_error(err: &(dyn StdError + 'static)) -> ClassifiedError {
    let kind = if chain(err).any(is_network) {
        ErrorKind::Connection
    } else if chain(err).any(is_tagged_no_rows) || err.to_string() == NO_ROWS_MESSAGE {
        ErrorKind::NoRows
    } else {
        ErrorKind::Other
    };
    ClassifiedError::new(kind, err)
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn StdError + 'static)| (*e).source())
}

fn is_network(err: &(dyn StdError + 'static)) -> bool {
    if let Some(driver) = err.downcast_ref::<DriverError>() {
        return driver.kind() == DriverErrorKind::Network;
    }
    if let Some(io) = err.downcast_ref::<io::Error>() {
        return is_network_io(io);
    }
    err.is::<tokio::time::error::Elapsed>()
}

fn is_tagged_no_rows(err: &(dyn StdError + 'static)) -> bool {
    err.downcast_ref::<DriverError>()
        .is_some_and(|driver| driver.kind() == DriverErrorKind::NoRows)
}

/// Whether an IO error kind belongs to the network layer.
pub(crate) fn is_network_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
    )
}
