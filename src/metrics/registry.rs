use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for run durations (seconds).
const RUN_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Histogram bucket boundaries for outbound HTTP calls (seconds).
const CALL_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "auditor_run_duration_seconds".to_string(),
                ),
                RUN_DURATION_BUCKETS,
            )
            .expect("valid matcher")
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_call_duration_seconds".to_string()),
                CALL_DURATION_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // admission / queue
        describe_counter!(
            "auditor_check_requests_total",
            Unit::Count,
            "Total /check requests by outcome"
        );
        describe_gauge!(
            "auditor_queue_depth",
            Unit::Count,
            "Current job queue depth"
        );
        describe_gauge!(
            "auditor_queue_running",
            Unit::Count,
            "1 if a job is currently running, else 0"
        );
        describe_counter!(
            "auditor_jobs_submitted_total",
            Unit::Count,
            "Total jobs admitted into the queue"
        );
        describe_counter!(
            "auditor_jobs_finished_total",
            Unit::Count,
            "Total jobs reaching a terminal state, by state"
        );

        // cache
        describe_counter!(
            "auditor_cache_lookup_total",
            Unit::Count,
            "Cache index lookups by result (hit, stale, miss)"
        );

        // router driver
        describe_counter!(
            "auditor_router_call_total",
            Unit::Count,
            "Router control-API calls by operation and result"
        );
        describe_histogram!(
            "auditor_router_call_duration_seconds",
            Unit::Seconds,
            "Router control-API call latency"
        );

        // probe providers
        describe_counter!(
            "auditor_probe_total",
            Unit::Count,
            "Probe attempts by provider and result"
        );
        describe_histogram!(
            "auditor_probe_call_duration_seconds",
            Unit::Seconds,
            "Probe provider call latency"
        );

        // checker
        describe_histogram!(
            "auditor_run_duration_seconds",
            Unit::Seconds,
            "Total duration of a single checker run"
        );
        describe_counter!(
            "auditor_nodes_processed_total",
            Unit::Count,
            "Proxy nodes processed by outcome (ok, skipped, switch_failed, probe_failed)"
        );
        describe_counter!(
            "auditor_atomic_saves_total",
            Unit::Count,
            "Atomic document saves performed, by result"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
