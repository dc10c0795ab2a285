//! Loading [`Config`] from `CLICKHOUSE_*` environment variables.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "CLICKHOUSE_";

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `CLICKHOUSE_HOSTS`, `CLICKHOUSE_USER`, `CLICKHOUSE_PASSWORD` and
    /// `CLICKHOUSE_DB` are required. See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// Booleans accept `1`, `t`, `T`, `TRUE`, `true`, `True` and their false
    /// counterparts. Durations are unit-suffixed sequences such as `10s`,
    /// `1h30m` or `250ms`. Maps are written `key:value,key2:value2`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup { lookup };

        let config = Self {
            shard_id: env.parse("SHARD_ID", parse_number)?.unwrap_or_default(),
            hosts: env.required("HOSTS")?,
            user: env.required("USER")?,
            password: env.required("PASSWORD")?,
            db: env.required("DB")?,

            max_open_conns: env.parse("MAX_OPEN_CONNS", parse_number)?.unwrap_or_default(),
            max_idle_conns: env.parse("MAX_IDLE_CONNS", parse_number)?.unwrap_or_default(),
            conn_max_lifetime: env
                .parse("CONN_MAX_LIFETIME", parse_duration)?
                .unwrap_or_default(),
            dial_timeout: env.parse("DIAL_TIMEOUT", parse_duration)?.unwrap_or_default(),
            read_timeout: env.parse("READ_TIMEOUT", parse_duration)?.unwrap_or_default(),
            debug: env.parse("DEBUG", parse_bool)?.unwrap_or_default(),
            free_buf_on_conn_release: env
                .parse("FREE_BUFFER_ON_CONN_RELEASE", parse_bool)?
                .unwrap_or_default(),
            insecure_skip_verify: env
                .parse("INSECURE_SKIP_VERIFY", parse_bool)?
                .unwrap_or_default(),
            block_buffer_size: env
                .parse("BLOCK_BUFFER_SIZE", parse_number)?
                .unwrap_or_default(),
            max_compression_buffer: env
                .parse("MAX_COMPRESSION_BUFFER", parse_number)?
                .unwrap_or_default(),

            http_headers: env.parse("HTTP_HEADERS", parse_map)?.unwrap_or_default(),
            http_url_path: env.optional("HTTP_URL_PATH").unwrap_or_default(),

            conn_open_strategy: env.optional("CONN_OPEN_STRATEGY").unwrap_or_default(),
            settings: env.parse("SETTINGS", parse_map)?.unwrap_or_default(),

            migrate_enabled: env.parse("MIGRATE_ENABLED", parse_bool)?.unwrap_or_default(),
            migrate_args: env.optional("MIGRATE_ARGS").unwrap_or_default(),
        };

        tracing::debug!(config = ?config, "loaded ClickHouse configuration");
        Ok(config)
    }
}

struct Lookup<F> {
    lookup: F,
}

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{name}"))
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name).ok_or_else(|| {
            Error::Config(format!("required variable {ENV_PREFIX}{name} is not set"))
        })
    }

    fn parse<T>(
        &self,
        name: &str,
        parser: fn(&str) -> std::result::Result<T, String>,
    ) -> Result<Option<T>> {
        match self.optional(name) {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => parser(&raw)
                .map(Some)
                .map_err(|reason| Error::Config(format!("{ENV_PREFIX}{name}: {reason}"))),
        }
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> std::result::Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid number: {raw}"))
}

fn parse_bool(raw: &str) -> std::result::Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(format!("invalid boolean: {raw}")),
    }
}

/// Parse `key:value` pairs separated by commas.
fn parse_map(raw: &str) -> std::result::Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for pair in raw.split(',') {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| format!("invalid map item: {pair}"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Parse a duration such as `300ms`, `1.5h` or `2h45m`.
///
/// Follows Go's `time.ParseDuration` grammar (fractional units, `µs`), which
/// `humantime` does not accept.
pub(crate) fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("invalid duration: {raw}");

    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    if raw.is_empty() || raw.starts_with('-') {
        return Err(invalid());
    }

    let mut total = 0f64;
    let mut rest = raw.trim_start_matches('+');
    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration: {raw}"))?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit {unit:?} in duration: {raw}")),
        };
        rest = &rest[unit_len..];

        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total.round() as u64))
}
