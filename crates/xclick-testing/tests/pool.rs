//! Pool construction tests against the mock driver.
//!
//! Every test registers metrics with its own [`Registry`] so tests can run
//! in parallel without colliding in the process-wide default registry.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::time::Duration;

use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Registry};
use sea_query::{Alias, Expr, Query};
use url::Url;
use uuid::Uuid;
use xclick::{
    Compression, Config, ConnOpenStrategy, DriverErrorKind, Error, ErrorKind, MigrationSource,
    Pool, Stats, TlsConfig, classify_error, classify_result, format_dsn,
};
use xclick_testing::{MockDriver, RecordingMigrator};

fn config() -> Config {
    Config::new()
        .hosts("ch-1:9000,ch-2:9000")
        .credentials("svc", "secret")
        .database("analytics")
        .shard_id(3)
}

fn sources() -> Vec<MigrationSource> {
    vec![
        MigrationSource::new("events")
            .with_file("000001_create_events.up.sql", "CREATE TABLE events (id Int64) ENGINE = MergeTree ORDER BY id"),
        MigrationSource::new("tasks")
            .with_file("000001_create_tasks.up.sql", "CREATE TABLE tasks (id Int64) ENGINE = MergeTree ORDER BY id")
            .with_file("000002_tasks_status.up.sql", "ALTER TABLE tasks ADD COLUMN status String"),
    ]
}

fn labels(family: &MetricFamily) -> HashMap<String, String> {
    family.get_metric()[0]
        .get_label()
        .iter()
        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
        .collect()
}

fn gauge(registry: &Registry, name: &str) -> f64 {
    registry
        .gather()
        .iter()
        .find(|family| family.get_name() == name)
        .map(|family| family.get_metric()[0].get_gauge().get_value())
        .unwrap_or_else(|| panic!("metric {name} not registered"))
}

#[tokio::test]
async fn test_build_resolves_defaults() {
    let driver = MockDriver::new();
    let pool = Pool::builder(driver.clone())
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let opened = driver.opened();
    assert_eq!(opened.len(), 1);

    let options = &opened[0];
    assert_eq!(options.addr, ["ch-1:9000", "ch-2:9000"]);
    assert_eq!(options.auth.database, "analytics");
    assert_eq!(options.auth.username, "svc");
    assert_eq!(options.auth.password, "secret");
    assert_eq!(options.max_open_conns, 32);
    assert_eq!(options.max_idle_conns, 8);
    assert_eq!(options.conn_max_lifetime, Duration::from_secs(3600));
    assert_eq!(options.dial_timeout, Duration::from_secs(10));
    assert_eq!(options.read_timeout, Duration::from_secs(10));
    assert_eq!(options.block_buffer_size, 2);
    assert_eq!(options.max_compression_buffer, 10 * 1024 * 1024);
    assert_eq!(options.conn_open_strategy, ConnOpenStrategy::InOrder);
    assert!(options.settings.is_none());
    assert!(options.http_headers.is_none());
    assert!(options.tls.is_none());
    assert!(options.compression.is_none());
    assert!(options.http_proxy.is_none());

    assert_eq!(pool.options(), options);
    assert_eq!(pool.ping_count(), 1);
    assert!(Uuid::parse_str(pool.id()).is_ok());
    assert!(pool.namespace().is_empty());
    assert!(pool.migrations().is_empty());
}

#[tokio::test]
async fn test_new_uses_default_registry() {
    let pool = Pool::new(MockDriver::new(), config()).await.unwrap();

    let name = "clickhouse_max_open_conns";
    let registered = prometheus::default_registry()
        .gather()
        .iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| family.get_metric().iter().map(|m| m.get_label().to_vec()))
        .any(|pairs| pairs.iter().any(|p| p.get_name() == "client_id" && p.get_value() == pool.id()));
    assert!(registered);

    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_last_client_id_wins() {
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .client_id("first")
        .client_id("second")
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let suffix = pool.id().strip_prefix("second-").expect("id keeps the prefix");
    assert!(Uuid::parse_str(suffix).is_ok());
    assert_eq!(pool.labels()["client_id"], pool.id());
}

#[tokio::test]
async fn test_empty_options_are_ignored() {
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .client_id("")
        .metrics_namespace("svc")
        .metrics_namespace("")
        .migrations(sources())
        .migrations(Vec::new())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    assert!(Uuid::parse_str(pool.id()).is_ok());
    assert_eq!(pool.namespace(), "svc");
    assert_eq!(pool.migrations().len(), 2);
}

#[tokio::test]
async fn test_metrics_reflect_connection_stats() {
    let registry = Registry::new();
    let pool = Pool::builder(MockDriver::new())
        .config(config().max_open_conns(16).max_idle_conns(4))
        .client_id("api")
        .metrics_namespace("svc")
        .registry(registry.clone())
        .build()
        .await
        .unwrap();

    pool.set_stats(Stats {
        max_open_conns: 16,
        open: 7,
        max_idle_conns: 4,
        idle: 3,
    });

    let families = registry.gather();
    let names: Vec<_> = families.iter().map(MetricFamily::get_name).collect();
    assert_eq!(
        names,
        [
            "svc_clickhouse_idle",
            "svc_clickhouse_max_idle_conns",
            "svc_clickhouse_max_open_conns",
            "svc_clickhouse_open_conns",
        ]
    );
    for family in &families {
        let labels = labels(family);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["client_id"], pool.id());
        assert_eq!(labels["db"], "analytics");
        assert_eq!(labels["shard_id"], "3");
    }

    assert_eq!(gauge(&registry, "svc_clickhouse_max_open_conns"), 16.0);
    assert_eq!(gauge(&registry, "svc_clickhouse_open_conns"), 7.0);
    assert_eq!(gauge(&registry, "svc_clickhouse_max_idle_conns"), 4.0);
    assert_eq!(gauge(&registry, "svc_clickhouse_idle"), 3.0);

    pool.set_stats(Stats {
        open: 9,
        idle: 1,
        ..pool.stats()
    });
    assert_eq!(gauge(&registry, "svc_clickhouse_open_conns"), 9.0);
    assert_eq!(gauge(&registry, "svc_clickhouse_idle"), 1.0);
}

#[tokio::test]
async fn test_migrations_applied_in_order_to_every_host() {
    let migrator = RecordingMigrator::new();
    let pool = Pool::builder(MockDriver::new())
        .config(config().migrate(true, "x-multi-statement=true"))
        .migrations(sources())
        .migrator(migrator.clone())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let expected = format_dsn("ch-1:9000,ch-2:9000", "svc", "secret", "analytics", "x-multi-statement=true");
    let applied = migrator.applied();
    assert_eq!(migrator.applied_names(), ["events", "tasks"]);
    assert_eq!(applied[0].dsns, expected);
    assert_eq!(applied[1].dsns, expected);
    assert_eq!(applied[1].files, 2);
    assert_eq!(pool.config().dsn(), expected);
}

#[tokio::test]
async fn test_migrations_disabled_are_skipped() {
    let migrator = RecordingMigrator::new();
    Pool::builder(MockDriver::new())
        .config(config())
        .migrations(sources())
        .migrator(migrator.clone())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    assert!(migrator.applied().is_empty());
}

#[tokio::test]
async fn test_failed_migration_releases_connection() {
    let driver = MockDriver::new();
    let registry = Registry::new();
    let migrator = RecordingMigrator::new().fail_on("tasks");

    let err = Pool::builder(driver.clone())
        .config(config().migrate(true, ""))
        .migrations(sources())
        .migrator(migrator.clone())
        .registry(registry.clone())
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Migration { ref source_name, .. } if source_name == "tasks"));
    assert_eq!(err.to_string(), "migration tasks failed: dirty database");
    assert_eq!(migrator.applied_names(), ["events"]);

    let conn = driver.last_connection().unwrap();
    assert_eq!(conn.close_count(), 1);
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn test_missing_migrator() {
    let driver = MockDriver::new();
    let err = Pool::builder(driver.clone())
        .config(config().migrate(true, ""))
        .migrations(sources())
        .registry(Registry::new())
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingMigrator));
    assert!(driver.last_connection().unwrap().is_closed());
}

#[tokio::test]
async fn test_open_failure() {
    let driver = MockDriver::new().fail_open("dial tcp ch-1:9000: connection refused");
    let err = Pool::builder(driver.clone())
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Open(_)));
    assert_eq!(err.to_string(), "dial tcp ch-1:9000: connection refused");
    assert_eq!(classify_error(&err).kind(), ErrorKind::Connection);
    assert!(driver.last_connection().is_none());
}

#[tokio::test]
async fn test_ping_failure_releases_connection() {
    let driver = MockDriver::new().fail_ping("read: connection reset by peer");
    let registry = Registry::new();
    let err = Pool::builder(driver.clone())
        .config(config())
        .registry(registry.clone())
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Ping(_)));
    assert_eq!(err.to_string(), "read: connection reset by peer");

    let conn = driver.last_connection().unwrap();
    assert_eq!(conn.ping_count(), 1);
    assert_eq!(conn.close_count(), 1);
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn test_release_failure_keeps_original_error() {
    let driver = MockDriver::new().fail_ping("ping failed").fail_close("close failed");
    let err = Pool::builder(driver.clone())
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "ping failed");
    assert!(driver.last_connection().unwrap().is_closed());
}

#[tokio::test]
async fn test_conflicting_registration_releases_connection() {
    let driver = MockDriver::new();
    let registry = Registry::new();
    registry
        .register(Box::new(Gauge::new("svc_clickhouse_idle", "Something else.").unwrap()))
        .unwrap();

    let err = Pool::builder(driver.clone())
        .config(config())
        .metrics_namespace("svc")
        .registry(registry)
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Metrics(_)));
    assert!(driver.last_connection().unwrap().is_closed());
}

#[tokio::test]
async fn test_two_pools_share_a_registry() {
    let registry = Registry::new();
    let build = |id: &'static str| {
        Pool::builder(MockDriver::new())
            .config(config())
            .client_id(id)
            .metrics_namespace("svc")
            .registry(registry.clone())
            .build()
    };

    let reader = build("reader").await.unwrap();
    let writer = build("writer").await.unwrap();

    let family = registry
        .gather()
        .into_iter()
        .find(|family| family.get_name() == "svc_clickhouse_open_conns")
        .unwrap();
    assert_eq!(family.get_metric().len(), 2);

    reader.close().await.unwrap();
    writer.close().await.unwrap();
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn test_close_unregisters_and_closes() {
    let driver = MockDriver::new();
    let registry = Registry::new();
    let pool = Pool::builder(driver.clone())
        .config(config())
        .registry(registry.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(registry.gather().len(), 4);

    pool.close().await.unwrap();

    assert!(registry.gather().is_empty());
    assert_eq!(driver.last_connection().unwrap().close_count(), 1);
}

#[tokio::test]
async fn test_close_failure() {
    let pool = Pool::builder(MockDriver::new().fail_close("already closed"))
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let err = pool.close().await.unwrap_err();
    assert!(matches!(err, Error::Close(_)));
    assert_eq!(err.to_string(), "already closed");
}

#[tokio::test]
async fn test_construction_timeout() {
    let driver = MockDriver::new().open_delay(Duration::from_secs(5));
    let err = Pool::builder(driver.clone())
        .config(config())
        .registry(Registry::new())
        .timeout(Duration::from_millis(20))
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(limit) if limit == Duration::from_millis(20)));
    assert!(driver.last_connection().is_none());
}

#[tokio::test]
async fn test_timeout_during_ping_releases_connection() {
    let driver = MockDriver::new().ping_delay(Duration::from_secs(5));
    let registry = Registry::new();
    let err = Pool::builder(driver.clone())
        .config(config())
        .registry(registry.clone())
        .timeout(Duration::from_millis(50))
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(limit) if limit == Duration::from_millis(50)));

    let conn = driver.last_connection().unwrap();
    assert_eq!(conn.ping_count(), 1);
    assert_eq!(conn.close_count(), 1);
    assert!(registry.gather().is_empty());
}

#[tokio::test]
async fn test_timeout_during_migrations_releases_connection() {
    let driver = MockDriver::new();
    let migrator = RecordingMigrator::new().delay(Duration::from_secs(5));
    let err = Pool::builder(driver.clone())
        .config(config().migrate(true, ""))
        .migrations(sources())
        .migrator(migrator.clone())
        .registry(Registry::new())
        .timeout(Duration::from_millis(50))
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(migrator.applied().is_empty());
    assert_eq!(driver.last_connection().unwrap().close_count(), 1);
}

#[tokio::test]
async fn test_timeout_not_reached() {
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .registry(Registry::new())
        .timeout(Duration::from_secs(5))
        .build()
        .await
        .unwrap();

    assert_eq!(pool.ping_count(), 1);
    assert_eq!(pool.close_count(), 0);
}

#[tokio::test]
async fn test_skip_verify_tls_from_config() {
    let driver = MockDriver::new();
    Pool::builder(driver.clone())
        .config(config().insecure_skip_verify(true))
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let tls = driver.opened()[0].tls.clone().unwrap();
    assert!(tls.insecure_skip_verify);
}

#[tokio::test]
async fn test_explicit_tls_keeps_skip_verify() {
    let driver = MockDriver::new();
    Pool::builder(driver.clone())
        .config(config().insecure_skip_verify(true))
        .tls(TlsConfig::new().server_name("ch.internal"))
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let tls = driver.opened()[0].tls.clone().unwrap();
    assert_eq!(tls.server_name.as_deref(), Some("ch.internal"));
    assert!(tls.insecure_skip_verify);
}

#[tokio::test]
async fn test_explicit_tls_verifies_by_default() {
    let driver = MockDriver::new();
    Pool::builder(driver.clone())
        .config(config())
        .tls(TlsConfig::new())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let tls = driver.opened()[0].tls.clone().unwrap();
    assert!(!tls.insecure_skip_verify);
}

#[tokio::test]
async fn test_compression_and_proxy_reach_driver() {
    let driver = MockDriver::new();
    let proxy = Url::parse("http://proxy.internal:3128").unwrap();
    Pool::builder(driver.clone())
        .config(config())
        .compression(Compression::zstd(3))
        .http_proxy(proxy.clone())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let options = &driver.opened()[0];
    assert_eq!(options.compression, Some(Compression::zstd(3)));
    assert_eq!(options.http_proxy, Some(proxy));
}

#[tokio::test]
async fn test_compression_can_be_cleared() {
    let driver = MockDriver::new();
    Pool::builder(driver.clone())
        .config(config())
        .compression(Compression::lz4())
        .compression(None)
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    assert!(driver.opened()[0].compression.is_none());
}

#[tokio::test]
async fn test_query_builder_uses_positional_placeholders() {
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let (sql, values) = Query::select()
        .column(Alias::new("id"))
        .from(Alias::new("tasks"))
        .and_where(Expr::col(Alias::new("status")).eq("done"))
        .and_where(Expr::col(Alias::new("id")).gt(10))
        .build(pool.query_builder());

    assert_eq!(sql, r#"SELECT "id" FROM "tasks" WHERE "status" = $1 AND "id" > $2"#);
    assert_eq!(values.0.len(), 2);
}

#[tokio::test]
async fn test_statement_errors_are_classified() {
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    let ok = pool.exec("SELECT 1").await;
    assert!(classify_result(&ok).is_none());

    pool.fail_exec(DriverErrorKind::NoRows, "sql: no rows in result set");
    let no_rows = pool.exec("SELECT 1 WHERE 0").await;
    assert!(classify_result(&no_rows).unwrap().is_no_rows());

    pool.fail_exec(DriverErrorKind::Network, "write: broken pipe");
    let broken = pool.exec("SELECT 1").await;
    let classified = classify_result(&broken).unwrap();
    assert!(classified.is_connection());
    assert_eq!(classified.message(), "write: broken pipe");
}

#[tokio::test]
async fn test_pool_logs_under_parent_span() {
    let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let parent = tracing::info_span!("service", name = "reporting");
    let pool = Pool::builder(MockDriver::new())
        .config(config())
        .logger(parent.clone())
        .registry(Registry::new())
        .build()
        .await
        .unwrap();

    assert_eq!(pool.logger().metadata().map(|m| m.name()), Some("clickhouse"));
}
