//! Connection strings for the migration tool.

/// Scheme used in migration DSNs.
pub const DSN_SCHEME: &str = "clickhouse";

/// Format one DSN per host.
///
/// Template: `clickhouse://<user>:<password>@<host>/<db>?<args>`, where
/// `hosts` is a comma-joined list. Host order is preserved. Values are
/// interpolated as-is without percent-encoding, so callers must pass values
/// that are already safe inside a URI.
///
/// These strings are handed to the migration tool only; the live connection
/// is opened from [`DriverOptions`](crate::DriverOptions).
#[must_use]
pub fn format_dsn(hosts: &str, user: &str, password: &str, db: &str, args: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(|host| format!("{DSN_SCHEME}://{user}:{password}@{host}/{db}?{args}"))
        .collect()
}
