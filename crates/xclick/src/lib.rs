//! # xclick
//!
//! Configuration and lifecycle layer for ClickHouse connection pools.
//!
//! This crate does not speak the ClickHouse protocol. It turns a flat,
//! environment-driven [`Config`] into a ready connection handle opened
//! through a pluggable [`Driver`], and takes care of everything around it.
//!
//! ## Features
//!
//! - **Environment config**: `CLICKHOUSE_*` variables with sensible defaults
//! - **Construction sequence**: open, ping, migrate, register metrics
//! - **Guaranteed release**: the connection is closed on any failure after open
//! - **Migrations**: one [`Migrator`] run per source, against every host
//! - **Metrics**: connection gauges exported through `prometheus`
//! - **Error classification**: connection, no-rows, or other
//!
//! ## Example
//!
//! ```rust,ignore
//! use xclick::{Config, Pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!
//!     let pool = Pool::builder(MyDriver::default())
//!         .config(config)
//!         .client_id("reporting")
//!         .metrics_namespace("reporting")
//!         .build()
//!         .await?;
//!
//!     let result = pool.query("SELECT 1").await;
//!     if let Some(err) = xclick::classify_result(&result) {
//!         if err.is_connection() {
//!             tracing::warn!(error = %err, "clickhouse unavailable");
//!         }
//!     }
//!
//!     pool.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod driver;
pub mod dsn;
pub mod env;
pub mod error;
pub mod migrate;
pub mod options;
pub mod pool;
pub mod tls;

// Re-export commonly used types
pub use classify::{ClassifiedError, ErrorKind, NO_ROWS_MESSAGE, classify, classify_error, classify_result};
pub use config::Config;
pub use driver::{Connection, Driver};
pub use dsn::format_dsn;
pub use error::{BoxError, DriverError, DriverErrorKind, Error, Result};
pub use migrate::{MigrationFile, MigrationSource, Migrator};
pub use options::{Auth, Compression, CompressionMethod, ConnOpenStrategy, DriverOptions};
pub use pool::{Pool, PoolBuilder};
pub use tls::TlsConfig;
pub use xclick_collector::{Stats, StatsGetter};
