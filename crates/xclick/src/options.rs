//! Resolved driver options.
//!
//! [`DriverOptions`] is what a [`Driver`](crate::Driver) receives when the
//! pool opens its connection. It is produced by
//! [`Config::resolve`](crate::Config::resolve) with every default applied,
//! then completed with the TLS, compression and proxy settings that only the
//! pool builder can supply.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::tls::TlsConfig;

/// Default maximum number of open connections.
pub const DEFAULT_MAX_OPEN_CONNS: usize = 32;
/// Default maximum number of idle connections.
pub const DEFAULT_MAX_IDLE_CONNS: usize = 8;
/// Default connection lifetime.
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
/// Default dial timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of blocks buffered per column.
pub const DEFAULT_BLOCK_BUFFER_SIZE: u8 = 2;
/// Default maximum compression buffer, 10 MiB.
pub const DEFAULT_MAX_COMPRESSION_BUFFER: usize = 10 * 1024 * 1024;

/// Policy for picking which host a new physical connection targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnOpenStrategy {
    /// Try hosts in the configured order.
    #[default]
    InOrder,
    /// Rotate through hosts.
    RoundRobin,
    /// Pick a random host.
    Random,
}

impl ConnOpenStrategy {
    /// Resolve a strategy name.
    ///
    /// Matches `in_order`, `round_robin` and `random` exactly. Any other
    /// input, including the empty string, resolves to [`Self::InOrder`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "in_order" => Self::InOrder,
            "round_robin" => Self::RoundRobin,
            "random" => Self::Random,
            _ => Self::InOrder,
        }
    }

    /// Get the configuration name of this strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InOrder => "in_order",
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

impl std::fmt::Display for ConnOpenStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block compression method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// No compression.
    #[default]
    None,
    /// LZ4.
    Lz4,
    /// LZ4 high compression.
    Lz4hc,
    /// Zstandard.
    Zstd,
    /// Gzip (HTTP interface only).
    Gzip,
    /// Deflate (HTTP interface only).
    Deflate,
    /// Brotli (HTTP interface only).
    Brotli,
}

/// Compression settings handed to the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Compression {
    /// Compression method.
    pub method: CompressionMethod,
    /// Method-specific level; 0 means the method's default.
    pub level: i32,
}

impl Compression {
    /// Create compression settings.
    #[must_use]
    pub fn new(method: CompressionMethod, level: i32) -> Self {
        Self { method, level }
    }

    /// LZ4 with the default level.
    #[must_use]
    pub fn lz4() -> Self {
        Self::new(CompressionMethod::Lz4, 0)
    }

    /// Zstandard with the given level.
    #[must_use]
    pub fn zstd(level: i32) -> Self {
        Self::new(CompressionMethod::Zstd, level)
    }
}

/// Authentication settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Auth {
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fully populated options passed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Host addresses, in configured order.
    pub addr: Vec<String>,
    /// Authentication settings.
    pub auth: Auth,
    /// Maximum open connections.
    pub max_open_conns: usize,
    /// Maximum idle connections.
    pub max_idle_conns: usize,
    /// Maximum lifetime of a connection.
    pub conn_max_lifetime: Duration,
    /// Dial timeout.
    pub dial_timeout: Duration,
    /// Read timeout.
    pub read_timeout: Duration,
    /// Enable driver debug output.
    pub debug: bool,
    /// Release column buffers when a connection returns to the pool.
    pub free_buf_on_conn_release: bool,
    /// Blocks buffered per column.
    pub block_buffer_size: u8,
    /// Maximum compression buffer in bytes.
    pub max_compression_buffer: usize,
    /// Extra HTTP headers; `None` leaves the driver default.
    pub http_headers: Option<HashMap<String, String>>,
    /// HTTP URL path.
    pub http_url_path: String,
    /// Host selection policy.
    pub conn_open_strategy: ConnOpenStrategy,
    /// Server settings; `None` leaves the driver default.
    pub settings: Option<HashMap<String, String>>,
    /// TLS settings; `None` means plain TCP.
    pub tls: Option<TlsConfig>,
    /// Compression settings.
    pub compression: Option<Compression>,
    /// HTTP proxy.
    pub http_proxy: Option<Url>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            addr: Vec::new(),
            auth: Auth::default(),
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            conn_max_lifetime: DEFAULT_CONN_MAX_LIFETIME,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            debug: false,
            free_buf_on_conn_release: false,
            block_buffer_size: DEFAULT_BLOCK_BUFFER_SIZE,
            max_compression_buffer: DEFAULT_MAX_COMPRESSION_BUFFER,
            http_headers: None,
            http_url_path: String::new(),
            conn_open_strategy: ConnOpenStrategy::InOrder,
            settings: None,
            tls: None,
            compression: None,
            http_proxy: None,
        }
    }
}

impl DriverOptions {
    /// Attach explicitly supplied TLS settings.
    ///
    /// An explicit object replaces whatever was resolved from configuration.
    /// If the resolved options already disable certificate verification, the
    /// attached object keeps verification disabled.
    #[must_use]
    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        let skip_verify = self
            .tls
            .as_ref()
            .is_some_and(|current| current.insecure_skip_verify);

        if let Some(tls) = tls {
            let skip_verify = tls.insecure_skip_verify || skip_verify;
            self.tls = Some(tls.insecure_skip_verify(skip_verify));
        }
        self
    }

    /// Attach compression settings.
    #[must_use]
    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Attach an HTTP proxy.
    #[must_use]
    pub fn with_http_proxy(mut self, proxy: Option<Url>) -> Self {
        self.http_proxy = proxy;
        self
    }
}
