//! # xclick-testing
//!
//! Test infrastructure for the xclick pool layer.
//!
//! ## Features
//!
//! - **Mock driver**: scripted open, ping and close outcomes, with every
//!   [`DriverOptions`](xclick::DriverOptions) it was asked to open recorded
//! - **Mock connection**: call counters and settable statistics
//! - **Recording migrator**: remembers each applied source and its targets
//!
//! ## Example
//!
//! ```rust,ignore
//! use xclick::{Config, Pool};
//! use xclick_testing::{MockDriver, RecordingMigrator};
//!
//! let driver = MockDriver::new();
//! let pool = Pool::builder(driver.clone())
//!     .config(Config::new().hosts("127.0.0.1:9000").database("test"))
//!     .build()
//!     .await?;
//!
//! assert_eq!(driver.opened().len(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod driver;
pub mod migrator;

pub use driver::{MockConnection, MockDriver};
pub use migrator::{AppliedSource, RecordingMigrator};
