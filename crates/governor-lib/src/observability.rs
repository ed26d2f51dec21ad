//! Observability for the fleet governor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, governed containers per tier, evictions)
//! - Structured event logging with tracing

use crate::models::{ContainerRecord, Tier};
use prometheus::{
    proto::MetricFamily, register_histogram, register_int_counter, register_int_gauge_vec,
    Histogram, IntCounter, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<FleetMetricsInner> = OnceLock::new();

struct FleetMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles: IntCounter,
    governed_containers: IntGaugeVec,
    evictions: IntCounter,
    failed_evictions: IntCounter,
    emergency_trims: IntCounter,
    snapshot_failures: IntCounter,
    inventory_failures: IntCounter,
    persistence_failures: IntCounter,
    provisioning_runs: IntCounter,
    provisioning_failures: IntCounter,
}

impl FleetMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "fleet_governor_cycle_latency_seconds",
                "Time spent in one classify, govern and record cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles: register_int_counter!(
                "fleet_governor_cycles_total",
                "Number of monitoring cycles completed"
            )
            .expect("Failed to register cycles_total"),

            governed_containers: register_int_gauge_vec!(
                "fleet_governor_containers",
                "Containers seen in the last cycle by tier",
                &["tier"]
            )
            .expect("Failed to register containers"),

            evictions: register_int_counter!(
                "fleet_governor_evictions_total",
                "Containers stopped and removed by the governor"
            )
            .expect("Failed to register evictions_total"),

            failed_evictions: register_int_counter!(
                "fleet_governor_failed_evictions_total",
                "Eviction candidates whose removal failed"
            )
            .expect("Failed to register failed_evictions_total"),

            emergency_trims: register_int_counter!(
                "fleet_governor_emergency_trims_total",
                "Cycles where the governed population exceeded the ceiling"
            )
            .expect("Failed to register emergency_trims_total"),

            snapshot_failures: register_int_counter!(
                "fleet_governor_snapshot_failures_total",
                "Snapshot documents that were missing or malformed"
            )
            .expect("Failed to register snapshot_failures_total"),

            inventory_failures: register_int_counter!(
                "fleet_governor_inventory_failures_total",
                "Failed container runtime inventory queries"
            )
            .expect("Failed to register inventory_failures_total"),

            persistence_failures: register_int_counter!(
                "fleet_governor_persistence_failures_total",
                "Rows that could not be written to the metrics store"
            )
            .expect("Failed to register persistence_failures_total"),

            provisioning_runs: register_int_counter!(
                "fleet_governor_provisioning_runs_total",
                "Provisioning trigger invocations"
            )
            .expect("Failed to register provisioning_runs_total"),

            provisioning_failures: register_int_counter!(
                "fleet_governor_provisioning_failures_total",
                "Provisioning trigger invocations that failed"
            )
            .expect("Failed to register provisioning_failures_total"),
        }
    }
}

/// Handle to the process-global governor metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct FleetMetrics {
    _private: (),
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &FleetMetricsInner {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new)
    }

    pub fn observe_cycle(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
        self.inner().cycles.inc();
    }

    pub fn set_tier_count(&self, tier: Tier, count: usize) {
        self.inner()
            .governed_containers
            .with_label_values(&[tier.as_str()])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn add_evictions(&self, evicted: usize, failed: usize) {
        self.inner().evictions.inc_by(evicted as u64);
        self.inner().failed_evictions.inc_by(failed as u64);
    }

    pub fn inc_emergency_trims(&self) {
        self.inner().emergency_trims.inc();
    }

    pub fn inc_snapshot_failures(&self) {
        self.inner().snapshot_failures.inc();
    }

    pub fn inc_inventory_failures(&self) {
        self.inner().inventory_failures.inc();
    }

    pub fn add_persistence_failures(&self, rows: usize) {
        self.inner().persistence_failures.inc_by(rows as u64);
    }

    pub fn record_provisioning(&self, success: bool) {
        self.inner().provisioning_runs.inc();
        if !success {
            self.inner().provisioning_failures.inc();
        }
    }

    pub fn evictions_total(&self) -> u64 {
        self.inner().evictions.get()
    }

    /// Snapshot of every registered family, governor collectors included
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner();
        prometheus::gather()
    }
}

/// Structured logger for governor lifecycle events
#[derive(Clone)]
pub struct FleetLogger {
    host: String,
}

impl FleetLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn log_startup(&self, version: &str, database: &str) {
        info!(
            event = "governor_started",
            host = %self.host,
            version = %version,
            database = %database,
            "Fleet governor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "governor_shutdown",
            host = %self.host,
            reason = %reason,
            "Fleet governor shutting down"
        );
    }

    pub fn log_cycle(
        &self,
        low: usize,
        high: usize,
        unclassified: usize,
        evicted: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_complete",
            host = %self.host,
            low = low,
            high = high,
            unclassified = unclassified,
            evicted = evicted,
            elapsed_ms = elapsed_ms,
            "Monitoring cycle complete"
        );
    }

    pub fn log_emergency(&self, governed: usize, ceiling: usize) {
        warn!(
            event = "emergency_trim",
            host = %self.host,
            governed = governed,
            ceiling = ceiling,
            "Governed population above ceiling"
        );
    }

    pub fn log_eviction(&self, record: &ContainerRecord) {
        info!(
            event = "container_evicted",
            host = %self.host,
            container_id = %record.short_id(),
            container = %record.name,
            image = %record.image,
            tier = %record.tier,
            estimated_ram = record.estimated_ram,
            estimated_cpu = record.estimated_cpu,
            "Container evicted"
        );
    }

    pub fn log_teardown(&self, removed: usize, failed: usize) {
        if failed == 0 {
            info!(
                event = "teardown_complete",
                host = %self.host,
                removed = removed,
                "Governed containers removed"
            );
        } else {
            warn!(
                event = "teardown_complete",
                host = %self.host,
                removed = removed,
                failed = failed,
                "Teardown finished with failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_metrics_handles_share_state() {
        let a = FleetMetrics::new();
        let b = a.clone();

        let before = b.evictions_total();
        a.add_evictions(2, 1);
        // other tests may evict concurrently through the same registry
        assert!(b.evictions_total() >= before + 2);

        a.observe_cycle(0.2);
        a.set_tier_count(Tier::Low, 3);
        a.record_provisioning(false);
    }

    #[test]
    fn test_gather_includes_governor_families() {
        let metrics = FleetMetrics::new();
        metrics.inc_emergency_trims();

        let names: Vec<String> = metrics
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "fleet_governor_emergency_trims_total"));
        assert!(names.iter().any(|n| n == "fleet_governor_evictions_total"));
    }

    #[test]
    fn test_fleet_logger_creation() {
        let logger = FleetLogger::new("node-1");
        assert_eq!(logger.host, "node-1");
    }
}
