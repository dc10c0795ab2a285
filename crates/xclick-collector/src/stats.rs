//! Connection statistics snapshot.

use std::sync::Arc;

/// A point-in-time snapshot of connection pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Maximum number of open connections to the database.
    pub max_open_conns: usize,
    /// The number of established connections both in use and idle.
    pub open: usize,
    /// Maximum number of idle connections to the database.
    pub max_idle_conns: usize,
    /// The number of idle connections.
    pub idle: usize,
}

impl Stats {
    /// Number of connections currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.open.saturating_sub(self.idle)
    }
}

/// Anything that can report a [`Stats`] snapshot.
///
/// Implementations must be safe to call concurrently; the collector takes no
/// lock of its own around `stats()`.
pub trait StatsGetter: Send + Sync {
    /// Return the current statistics.
    fn stats(&self) -> Stats;
}

impl<T: StatsGetter + ?Sized> StatsGetter for Arc<T> {
    fn stats(&self) -> Stats {
        (**self).stats()
    }
}

impl<T: StatsGetter + ?Sized> StatsGetter for &T {
    fn stats(&self) -> Stats {
        (**self).stats()
    }
}
