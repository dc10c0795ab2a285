//! Pool configuration.
//!
//! [`Config`] is the raw, partially specified input. Zero and empty values
//! mean "not set"; [`Config::resolve`] replaces them with defaults and
//! produces the [`DriverOptions`] handed to the driver.

use std::collections::HashMap;
use std::time::Duration;

use crate::dsn::format_dsn;
use crate::options::{
    Auth, ConnOpenStrategy, DEFAULT_BLOCK_BUFFER_SIZE, DEFAULT_CONN_MAX_LIFETIME,
    DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_COMPRESSION_BUFFER, DEFAULT_MAX_IDLE_CONNS,
    DEFAULT_MAX_OPEN_CONNS, DEFAULT_READ_TIMEOUT, DriverOptions,
};
use crate::tls::TlsConfig;

/// Configuration for a ClickHouse pool.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Shard identifier, exported as the `shard_id` metric label.
    pub shard_id: u32,
    /// Comma-joined `host:port` list.
    pub hosts: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database name.
    pub db: String,

    /// Maximum open connections (default: 32).
    pub max_open_conns: usize,
    /// Maximum idle connections (default: 8).
    pub max_idle_conns: usize,
    /// Maximum connection lifetime (default: 1 hour).
    pub conn_max_lifetime: Duration,
    /// Dial timeout (default: 10 seconds).
    pub dial_timeout: Duration,
    /// Read timeout (default: 10 seconds).
    pub read_timeout: Duration,
    /// Enable driver debug output.
    pub debug: bool,
    /// Release column buffers when a connection returns to the pool.
    pub free_buf_on_conn_release: bool,
    /// Disable TLS certificate verification. Development only.
    pub insecure_skip_verify: bool,
    /// Blocks buffered per column (default: 2).
    pub block_buffer_size: u8,
    /// Maximum compression buffer in bytes (default: 10 MiB).
    pub max_compression_buffer: usize,

    /// Extra HTTP headers.
    pub http_headers: HashMap<String, String>,
    /// HTTP URL path.
    pub http_url_path: String,

    /// Host selection policy: `in_order`, `round_robin` or `random`.
    pub conn_open_strategy: String,
    /// Server settings.
    pub settings: HashMap<String, String>,

    /// Apply migrations during pool construction.
    pub migrate_enabled: bool,
    /// Query string appended to migration DSNs.
    pub migrate_args: String,
}

impl Config {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comma-joined host list.
    #[must_use]
    pub fn hosts(mut self, hosts: impl Into<String>) -> Self {
        self.hosts = hosts.into();
        self
    }

    /// Set the user name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Set the shard identifier.
    #[must_use]
    pub fn shard_id(mut self, shard_id: u32) -> Self {
        self.shard_id = shard_id;
        self
    }

    /// Set the maximum number of open connections.
    #[must_use]
    pub fn max_open_conns(mut self, count: usize) -> Self {
        self.max_open_conns = count;
        self
    }

    /// Set the maximum number of idle connections.
    #[must_use]
    pub fn max_idle_conns(mut self, count: usize) -> Self {
        self.max_idle_conns = count;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    /// Set the dial timeout.
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the host selection policy by name.
    #[must_use]
    pub fn conn_open_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.conn_open_strategy = strategy.into();
        self
    }

    /// Add a server setting.
    #[must_use]
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Add an HTTP header.
    #[must_use]
    pub fn http_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(key.into(), value.into());
        self
    }

    /// Disable TLS certificate verification.
    #[must_use]
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Enable migrations with the given DSN query arguments.
    #[must_use]
    pub fn migrate(mut self, enabled: bool, args: impl Into<String>) -> Self {
        self.migrate_enabled = enabled;
        self.migrate_args = args.into();
        self
    }

    /// Split the host list into addresses.
    ///
    /// No trimming, deduplication or syntax check is applied.
    #[must_use]
    pub fn host_list(&self) -> Vec<String> {
        self.hosts.split(',').map(str::to_string).collect()
    }

    /// Format one migration DSN per host.
    #[must_use]
    pub fn dsn(&self) -> Vec<String> {
        format_dsn(
            &self.hosts,
            &self.user,
            &self.password,
            &self.db,
            &self.migrate_args,
        )
    }

    /// Resolve into driver options, applying defaults to unset fields.
    ///
    /// TLS with verification disabled is attached when
    /// `insecure_skip_verify` is set; compression and proxy are left unset
    /// for the pool builder to supply.
    #[must_use]
    pub fn resolve(&self) -> DriverOptions {
        DriverOptions {
            addr: self.host_list(),
            auth: Auth {
                database: self.db.clone(),
                username: self.user.clone(),
                password: self.password.clone(),
            },
            max_open_conns: non_zero(self.max_open_conns, DEFAULT_MAX_OPEN_CONNS),
            max_idle_conns: non_zero(self.max_idle_conns, DEFAULT_MAX_IDLE_CONNS),
            conn_max_lifetime: non_zero(self.conn_max_lifetime, DEFAULT_CONN_MAX_LIFETIME),
            dial_timeout: non_zero(self.dial_timeout, DEFAULT_DIAL_TIMEOUT),
            read_timeout: non_zero(self.read_timeout, DEFAULT_READ_TIMEOUT),
            debug: self.debug,
            free_buf_on_conn_release: self.free_buf_on_conn_release,
            block_buffer_size: non_zero(self.block_buffer_size, DEFAULT_BLOCK_BUFFER_SIZE),
            max_compression_buffer: non_zero(
                self.max_compression_buffer,
                DEFAULT_MAX_COMPRESSION_BUFFER,
            ),
            http_headers: non_empty(&self.http_headers),
            http_url_path: self.http_url_path.clone(),
            conn_open_strategy: ConnOpenStrategy::parse(&self.conn_open_strategy),
            settings: non_empty(&self.settings),
            tls: self.insecure_skip_verify.then(TlsConfig::insecure),
            compression: None,
            http_proxy: None,
        }
    }
}

fn non_zero<T: Default + PartialEq>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

fn non_empty(map: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("shard_id", &self.shard_id)
            .field("hosts", &self.hosts)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("debug", &self.debug)
            .field("free_buf_on_conn_release", &self.free_buf_on_conn_release)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("block_buffer_size", &self.block_buffer_size)
            .field("max_compression_buffer", &self.max_compression_buffer)
            .field("http_headers", &self.http_headers.keys().collect::<Vec<_>>())
            .field("http_url_path", &self.http_url_path)
            .field("conn_open_strategy", &self.conn_open_strategy)
            .field("settings", &self.settings)
            .field("migrate_enabled", &self.migrate_enabled)
            .field("migrate_args", &self.migrate_args)
            .finish()
    }
}
