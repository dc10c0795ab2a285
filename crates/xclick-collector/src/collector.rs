//! Prometheus collector over a [`StatsGetter`].

use std::collections::HashMap;

use prometheus::core::{Collector, Desc, Describer};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Opts};

use crate::stats::StatsGetter;

/// Exposes the four pool gauges of a [`StatsGetter`].
///
/// Metric descriptions are built once in [`StatsCollector::new`]. Every call
/// to [`Collector::collect`] takes exactly one [`Stats`](crate::Stats)
/// snapshot and emits four readings derived from it. Readings are built per
/// scrape, so concurrent scrapes never observe each other's values.
#[derive(Clone)]
pub struct StatsCollector<S> {
    source: S,

    max_open_conns: Opts,
    open_conns: Opts,
    max_idle_conns: Opts,
    idle_conns: Opts,

    descs: Vec<Desc>,
}

impl<S: StatsGetter> StatsCollector<S> {
    /// Create a collector with names built from `namespace` and `subsystem`.
    ///
    /// Every reading carries `const_labels`. Fails if a name or label is not
    /// a valid Prometheus identifier.
    pub fn new(
        namespace: &str,
        subsystem: &str,
        const_labels: HashMap<String, String>,
        source: S,
    ) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(namespace)
                .subsystem(subsystem)
                .const_labels(const_labels.clone())
        };

        let max_open_conns = opts(
            "max_open_conns",
            "Maximum number of open connections to the database.",
        );
        let open_conns = opts(
            "open_conns",
            "The number of established connections both in use and idle.",
        );
        let max_idle_conns = opts(
            "max_idle_conns",
            "Maximum number of idle connections to the database.",
        );
        let idle_conns = opts("idle", "The number of idle connections.");

        let descs = vec![
            max_open_conns.describe()?,
            open_conns.describe()?,
            idle_conns.describe()?,
            max_idle_conns.describe()?,
        ];

        Ok(Self {
            source,
            max_open_conns,
            open_conns,
            max_idle_conns,
            idle_conns,
            descs,
        })
    }

    /// Get the wrapped statistics source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: StatsGetter> Collector for StatsCollector<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let stats = self.source.stats();

        let readings = [
            (&self.max_open_conns, stats.max_open_conns),
            (&self.open_conns, stats.open),
            (&self.max_idle_conns, stats.max_idle_conns),
            (&self.idle_conns, stats.idle),
        ];

        let mut families = Vec::with_capacity(readings.len());
        for (opts, value) in readings {
            match Gauge::with_opts(opts.clone()) {
                Ok(gauge) => {
                    gauge.set(value as f64);
                    families.extend(gauge.collect());
                }
                Err(err) => {
                    tracing::warn!(
                        metric = %opts.fq_name(),
                        error = %err,
                        "dropping pool gauge reading"
                    );
                }
            }
        }
        families
    }
}

impl<S> std::fmt::Debug for StatsCollector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCollector")
            .field("max_open_conns", &self.max_open_conns.fq_name())
            .field("open_conns", &self.open_conns.fq_name())
            .field("max_idle_conns", &self.max_idle_conns.fq_name())
            .field("idle_conns", &self.idle_conns.fq_name())
            .finish()
    }
}
