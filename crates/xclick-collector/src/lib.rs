//! # xclick-collector
//!
//! Prometheus collector that turns ClickHouse connection pool statistics into
//! gauge readings.
//!
//! The collector does not own any counters. It wraps a [`StatsGetter`] and
//! reads a fresh [`Stats`] snapshot on every scrape, so the values exposed are
//! always those of the underlying connection at scrape time.
//!
//! ## Exported metrics
//!
//! | Name                                  | Meaning                                      |
//! |---------------------------------------|----------------------------------------------|
//! | `{ns}_{subsystem}_max_open_conns`     | Maximum number of open connections           |
//! | `{ns}_{subsystem}_open_conns`         | Established connections, in use and idle     |
//! | `{ns}_{subsystem}_max_idle_conns`     | Maximum number of idle connections           |
//! | `{ns}_{subsystem}_idle`               | Idle connections                             |
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use xclick_collector::StatsCollector;
//!
//! let collector = StatsCollector::new("app", "clickhouse", HashMap::new(), conn)?;
//! registry.register(Box::new(collector))?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod collector;
pub mod stats;

pub use collector::StatsCollector;
pub use stats::{Stats, StatsGetter};
