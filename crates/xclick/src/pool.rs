//! Pool construction.
//!
//! [`PoolBuilder`] collects construction settings (last call wins), then
//! [`PoolBuilder::build`] runs the construction sequence:
//!
//! 1. resolve [`Config`] into [`DriverOptions`] and attach TLS, compression
//!    and proxy settings;
//! 2. open the connection through the [`Driver`];
//! 3. ping it;
//! 4. apply migrations, once per source, if enabled;
//! 5. register a [`StatsCollector`] over the connection.
//!
//! Any failure aborts construction. Once the connection is open, every
//! failing path closes it before the error is returned.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use sea_query::PostgresQueryBuilder;
use tokio::time::Instant;
use tracing::{Instrument, Span};
use url::Url;
use uuid::Uuid;
use xclick_collector::{Stats, StatsCollector, StatsGetter};

use crate::config::Config;
use crate::driver::{Connection, Driver};
use crate::error::{Error, Result};
use crate::migrate::{MigrationSource, Migrator, apply_sources};
use crate::options::{Compression, DriverOptions};
use crate::tls::TlsConfig;

/// Subsystem segment of every exported metric name.
pub const METRICS_SUBSYSTEM: &str = "clickhouse";

/// Metric label carrying the pool identifier.
pub const LABEL_CLIENT_ID: &str = "client_id";
/// Metric label carrying the database name.
pub const LABEL_DB: &str = "db";
/// Metric label carrying the shard identifier.
pub const LABEL_SHARD_ID: &str = "shard_id";

/// A ready ClickHouse connection with its configuration and metrics identity.
///
/// The pool dereferences to the driver connection, so queries go straight
/// through it. Everything else is fixed at construction.
///
/// Call [`close`](Self::close) when done. Dropping a pool leaves its stats
/// collector registered, and the registry then keeps the connection alive.
///
/// # Example
///
/// ```rust,ignore
/// use xclick::{Config, Pool};
///
/// let config = Config::from_env()?;
///
/// let pool = Pool::builder(driver)
///     .config(config)
///     .client_id("reporting")
///     .migrations([MigrationSource::from_static("tasks", TASKS)])
///     .migrator(migrator)
///     .metrics_namespace("reporting")
///     .build()
///     .await?;
///
/// pool.ping().await?;
/// pool.close().await?;
/// ```
pub struct Pool<C: Connection> {
    conn: Arc<C>,
    id: String,
    config: Config,
    options: DriverOptions,
    span: Span,
    namespace: String,
    labels: HashMap<String, String>,
    migrations: Vec<MigrationSource>,
    registry: Registry,
    collector: StatsCollector<Arc<C>>,
}

impl<C: Connection> Pool<C> {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder<D>(driver: D) -> PoolBuilder<D>
    where
        D: Driver<Connection = C>,
    {
        PoolBuilder::new(driver)
    }

    /// Create a pool with the given configuration and default settings.
    ///
    /// For more control over pool creation, use [`Pool::builder()`].
    pub async fn new<D>(driver: D, config: Config) -> Result<Self>
    where
        D: Driver<Connection = C>,
    {
        Self::builder(driver).config(config).build().await
    }

    /// Get the pool identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the configuration the pool was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the options the connection was opened with.
    #[must_use]
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Get the pool's span, tagged with `component = "clickhouse"`.
    #[must_use]
    pub fn logger(&self) -> &Span {
        &self.span
    }

    /// Get a statement builder using `$n` positional placeholders.
    #[must_use]
    pub fn query_builder(&self) -> PostgresQueryBuilder {
        PostgresQueryBuilder
    }

    /// Get the metrics namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the constant metric labels.
    #[must_use]
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Get the configured migration sources.
    #[must_use]
    pub fn migrations(&self) -> &[MigrationSource] {
        &self.migrations
    }

    /// Get the registry the stats collector is registered with.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get a shared handle to the connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// Get current connection statistics.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.conn.stats()
    }

    /// Unregister the stats collector and close the connection.
    pub async fn close(self) -> Result<()> {
        if let Err(err) = self.registry.unregister(Box::new(self.collector.clone())) {
            tracing::warn!(parent: &self.span, error = %err, "failed to unregister pool metrics");
        }

        self.conn
            .close()
            .await
            .map_err(|err| Error::Close(Box::new(err)))?;

        tracing::info!(parent: &self.span, "connection pool closed");
        Ok(())
    }
}

impl<C: Connection> Deref for Pool<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: Connection> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("hosts", &self.options.addr)
            .field("database", &self.config.db)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Builder for creating a [`Pool`].
///
/// Setters may be called in any order and repeatedly; the last call for a
/// setting wins. Nothing is validated until [`build`](Self::build).
pub struct PoolBuilder<D: Driver> {
    driver: D,
    config: Config,
    id: Option<String>,
    logger: Option<Span>,
    migrations: Vec<MigrationSource>,
    migrator: Option<Arc<dyn Migrator>>,
    compression: Option<Compression>,
    tls: Option<TlsConfig>,
    proxy: Option<Url>,
    namespace: String,
    registry: Option<Registry>,
    timeout: Option<Duration>,
}

impl<D: Driver> PoolBuilder<D> {
    /// Create a builder with an empty configuration.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            config: Config::default(),
            id: None,
            logger: None,
            migrations: Vec::new(),
            migrator: None,
            compression: None,
            tls: None,
            proxy: None,
            namespace: String::new(),
            registry: None,
            timeout: None,
        }
    }

    /// Set the parent span for the pool's span. Defaults to the current span.
    #[must_use]
    pub fn logger(mut self, span: Span) -> Self {
        self.logger = Some(span);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the client identifier.
    ///
    /// The pool id becomes `<id>-<uuid>` with a suffix generated on each
    /// call. An empty id is ignored.
    #[must_use]
    pub fn client_id(mut self, id: impl AsRef<str>) -> Self {
        let id = id.as_ref();
        if !id.is_empty() {
            self.id = Some(format!("{id}-{}", Uuid::new_v4()));
        }
        self
    }

    /// Set the migration sources, applied in the given order.
    ///
    /// An empty list is ignored.
    #[must_use]
    pub fn migrations(mut self, sources: impl IntoIterator<Item = MigrationSource>) -> Self {
        let sources: Vec<_> = sources.into_iter().collect();
        if !sources.is_empty() {
            self.migrations = sources;
        }
        self
    }

    /// Set the migrator that applies migration sources.
    #[must_use]
    pub fn migrator(mut self, migrator: impl Migrator + 'static) -> Self {
        self.migrator = Some(Arc::new(migrator));
        self
    }

    /// Set or clear compression.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<Option<Compression>>) -> Self {
        self.compression = compression.into();
        self
    }

    /// Set TLS settings.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set or clear the HTTP proxy.
    #[must_use]
    pub fn http_proxy(mut self, proxy: impl Into<Option<Url>>) -> Self {
        self.proxy = proxy.into();
        self
    }

    /// Set the metrics namespace. An empty namespace is ignored.
    #[must_use]
    pub fn metrics_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !namespace.is_empty() {
            self.namespace = namespace;
        }
        self
    }

    /// Set the registry for the stats collector.
    ///
    /// Defaults to the process-wide [`prometheus::default_registry`].
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Bound the whole construction sequence by a deadline.
    ///
    /// If the deadline passes after the connection was opened, the
    /// connection is closed before [`Error::Timeout`] is returned.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool<D::Connection>> {
        let id = self.id.clone().unwrap_or_else(generate_id);
        let parent = self.logger.clone().unwrap_or_else(Span::current);
        let span = tracing::info_span!(
            parent: &parent,
            "clickhouse",
            component = "clickhouse",
            client_id = %id
        );

        self.construct(id, span.clone()).instrument(span).await
    }

    async fn construct(self, id: String, span: Span) -> Result<Pool<D::Connection>> {
        let Self {
            driver,
            config,
            migrations,
            migrator,
            compression,
            tls,
            proxy,
            namespace,
            registry,
            timeout,
            ..
        } = self;
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let timed_out = || Error::Timeout(timeout.unwrap_or_default());

        let options = config
            .resolve()
            .with_tls(tls)
            .with_compression(compression)
            .with_http_proxy(proxy);

        tracing::info!(
            hosts = ?options.addr,
            database = %options.auth.database,
            strategy = %options.conn_open_strategy,
            "opening connection"
        );

        let conn = within(deadline, driver.open(&options))
            .await
            .ok_or_else(timed_out)?
            .map_err(|err| Error::Open(Box::new(err)))?;
        let conn = Arc::new(conn);

        let labels = metric_labels(&id, &config);
        let registry = registry.unwrap_or_else(|| prometheus::default_registry().clone());

        let setup = Setup {
            config: &config,
            migrations: &migrations,
            migrator: migrator.as_deref(),
            namespace: &namespace,
            labels: &labels,
            registry: &registry,
        };

        let outcome = within(deadline, setup.run(&conn))
            .await
            .unwrap_or_else(|| Err(timed_out()));
        let collector = match outcome {
            Ok(collector) => collector,
            Err(err) => {
                release(conn.as_ref()).await;
                return Err(err);
            }
        };

        tracing::info!("connection pool ready");

        Ok(Pool {
            conn,
            id,
            config,
            options,
            span,
            namespace,
            labels,
            migrations,
            registry,
            collector,
        })
    }
}

/// Construction steps that run once the connection is open.
struct Setup<'a> {
    config: &'a Config,
    migrations: &'a [MigrationSource],
    migrator: Option<&'a dyn Migrator>,
    namespace: &'a str,
    labels: &'a HashMap<String, String>,
    registry: &'a Registry,
}

impl Setup<'_> {
    async fn run<C: Connection>(&self, conn: &Arc<C>) -> Result<StatsCollector<Arc<C>>> {
        conn.ping().await.map_err(|err| Error::Ping(Box::new(err)))?;
        tracing::debug!("ping succeeded");

        if self.config.migrate_enabled && !self.migrations.is_empty() {
            let migrator = self.migrator.ok_or(Error::MissingMigrator)?;
            apply_sources(migrator, self.migrations, &self.config.dsn()).await?;
        }

        let collector = StatsCollector::new(
            self.namespace,
            METRICS_SUBSYSTEM,
            self.labels.clone(),
            Arc::clone(conn),
        )?;
        self.registry.register(Box::new(collector.clone()))?;
        tracing::debug!(namespace = %self.namespace, "registered pool metrics");

        Ok(collector)
    }
}

/// Run `fut` to completion, or until `deadline` passes. `None` on expiry.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn release<C: Connection>(conn: &C) {
    if let Err(err) = conn.close().await {
        tracing::warn!(error = %err, "failed to close connection after construction failure");
    }
}

fn metric_labels(id: &str, config: &Config) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_CLIENT_ID.to_string(), id.to_string()),
        (LABEL_DB.to_string(), config.db.clone()),
        (LABEL_SHARD_ID.to_string(), config.shard_id.to_string()),
    ])
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
