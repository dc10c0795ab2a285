//! Driver seam.
//!
//! The wire protocol, physical connection pooling and query execution all
//! belong to the driver. This crate only needs to open a connection from
//! [`DriverOptions`], check that it is alive, read its statistics and close
//! it.

use async_trait::async_trait;
use xclick_collector::StatsGetter;

use crate::options::DriverOptions;

/// A live, internally pooled connection to ClickHouse.
///
/// Implementations must be safe for concurrent use; the pool hands out
/// shared references to callers and to the metrics collector.
#[async_trait]
pub trait Connection: StatsGetter + Send + Sync + 'static {
    /// Error returned by connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Round-trip to the server.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Close every physical connection.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// Opens connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Connection type produced by this driver.
    type Connection: Connection;

    /// Error returned when opening fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a connection from fully resolved options.
    async fn open(&self, options: &DriverOptions) -> Result<Self::Connection, Self::Error>;
}
