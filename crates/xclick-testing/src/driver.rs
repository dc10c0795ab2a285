//! In-memory driver and connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use xclick::{Connection, Driver, DriverError, DriverErrorKind, DriverOptions};
use xclick_collector::{Stats, StatsGetter};

/// A scripted failure: the kind tag and message of the error to return.
type Failure = Option<(DriverErrorKind, String)>;

fn fail(failure: &Mutex<Failure>) -> Result<(), DriverError> {
    match &*failure.lock() {
        Some((kind, message)) => Err(DriverError::new(*kind, message.clone())),
        None => Ok(()),
    }
}

#[derive(Default)]
struct DriverState {
    opened: Mutex<Vec<DriverOptions>>,
    connections: Mutex<Vec<MockConnection>>,
    open_failure: Mutex<Failure>,
    open_delay: Mutex<Option<Duration>>,
    ping_delay: Mutex<Option<Duration>>,
    ping_failure: Mutex<Failure>,
    close_failure: Mutex<Failure>,
}

/// A [`Driver`] that hands out [`MockConnection`]s.
///
/// Clones share state, so a test can keep one handle while the pool builder
/// consumes another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<DriverState>,
}

impl MockDriver {
    /// Create a driver whose operations all succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every open with a network-tagged error.
    #[must_use]
    pub fn fail_open(self, message: impl Into<String>) -> Self {
        *self.state.open_failure.lock() = Some((DriverErrorKind::Network, message.into()));
        self
    }

    /// Delay every open.
    #[must_use]
    pub fn open_delay(self, delay: Duration) -> Self {
        *self.state.open_delay.lock() = Some(delay);
        self
    }

    /// Delay pings on connections opened from now on.
    #[must_use]
    pub fn ping_delay(self, delay: Duration) -> Self {
        *self.state.ping_delay.lock() = Some(delay);
        self
    }

    /// Fail pings on connections opened from now on.
    #[must_use]
    pub fn fail_ping(self, message: impl Into<String>) -> Self {
        *self.state.ping_failure.lock() = Some((DriverErrorKind::Network, message.into()));
        self
    }

    /// Fail closes on connections opened from now on.
    #[must_use]
    pub fn fail_close(self, message: impl Into<String>) -> Self {
        *self.state.close_failure.lock() = Some((DriverErrorKind::Other, message.into()));
        self
    }

    /// Options of every open attempt, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<DriverOptions> {
        self.state.opened.lock().clone()
    }

    /// The most recently opened connection.
    #[must_use]
    pub fn last_connection(&self) -> Option<MockConnection> {
        self.state.connections.lock().last().cloned()
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("opened", &self.state.opened.lock().len())
            .finish()
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;
    type Error = DriverError;

    async fn open(&self, options: &DriverOptions) -> Result<MockConnection, DriverError> {
        self.state.opened.lock().push(options.clone());

        let delay = *self.state.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        fail(&self.state.open_failure)?;

        let conn = MockConnection::new(Stats {
            max_open_conns: options.max_open_conns,
            max_idle_conns: options.max_idle_conns,
            ..Stats::default()
        });
        *conn.state.ping_delay.lock() = *self.state.ping_delay.lock();
        *conn.state.ping_failure.lock() = self.state.ping_failure.lock().clone();
        *conn.state.close_failure.lock() = self.state.close_failure.lock().clone();

        tracing::debug!(hosts = ?options.addr, "mock connection opened");
        self.state.connections.lock().push(conn.clone());
        Ok(conn)
    }
}

#[derive(Default)]
struct ConnectionState {
    stats: Mutex<Stats>,
    pings: AtomicUsize,
    closes: AtomicUsize,
    ping_delay: Mutex<Option<Duration>>,
    ping_failure: Mutex<Failure>,
    close_failure: Mutex<Failure>,
    exec_failure: Mutex<Failure>,
    executed: Mutex<Vec<String>>,
}

/// A [`Connection`] backed by counters.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<ConnectionState>,
}

impl MockConnection {
    /// Create a connection reporting `stats`.
    #[must_use]
    pub fn new(stats: Stats) -> Self {
        let conn = Self::default();
        *conn.state.stats.lock() = stats;
        conn
    }

    /// Replace the reported statistics.
    pub fn set_stats(&self, stats: Stats) {
        *self.state.stats.lock() = stats;
    }

    /// Fail subsequent statements with the given tag and message.
    pub fn fail_exec(&self, kind: DriverErrorKind, message: impl Into<String>) {
        *self.state.exec_failure.lock() = Some((kind, message.into()));
    }

    /// Number of pings received.
    #[must_use]
    pub fn ping_count(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Number of close calls received.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Whether close was called at least once.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// Statements executed so far.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// Record a statement, or fail as scripted by [`fail_exec`](Self::fail_exec).
    pub async fn exec(&self, sql: &str) -> Result<(), DriverError> {
        fail(&self.state.exec_failure)?;
        self.state.executed.lock().push(sql.to_string());
        Ok(())
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("pings", &self.ping_count())
            .field("closes", &self.close_count())
            .finish()
    }
}

impl StatsGetter for MockConnection {
    fn stats(&self) -> Stats {
        *self.state.stats.lock()
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Error = DriverError;

    async fn ping(&self) -> Result<(), DriverError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.ping_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        fail(&self.state.ping_failure)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        fail(&self.state.close_failure)
    }
}
