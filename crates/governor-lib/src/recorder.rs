//! Metrics recorder
//!
//! Persists the outcome of one cycle: one aggregate [`MetricsRow`], one
//! [`ContainerStatRow`] per workload process and one [`ProcessStatRow`] per
//! system process. A failed insert is logged and skipped; the remaining rows
//! are still written.
//!
//! Stat rows store resident memory divided by the configured divisor, which
//! defaults to 1. Aggregate host totals are never scaled.

use crate::classifier::Classification;
use crate::models::{ContainerStatRow, MetricsRow, ProcessStatRow};
use crate::snapshot::CycleSnapshot;
use crate::store::MetricsStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Container name stored for workload processes without a container
pub const UNKNOWN_CONTAINER: &str = "unknown";

/// What the recorder managed to persist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordReport {
    pub metrics_inserted: bool,
    pub container_rows: usize,
    pub process_rows: usize,
    pub failed_rows: usize,
}

/// Inputs describing one finished cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleFacts<'a> {
    /// Unix timestamp in milliseconds shared by every row of the cycle
    pub timestamp: i64,
    pub snapshot: &'a CycleSnapshot,
    pub classification: &'a Classification,
    /// Inventory size after evictions
    pub container_count: usize,
    pub deleted_count: usize,
}

/// Appends cycle metrics to the store
pub struct MetricsRecorder {
    store: Arc<MetricsStore>,
    memory_divisor: i64,
}

impl MetricsRecorder {
    pub fn new(store: Arc<MetricsStore>) -> Self {
        Self {
            store,
            memory_divisor: 1,
        }
    }

    /// Scale stat-row memory down by `divisor`; non-positive values are ignored
    pub fn with_memory_divisor(mut self, divisor: i64) -> Self {
        if divisor > 0 {
            self.memory_divisor = divisor;
        }
        self
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    /// Persist everything known about one cycle
    pub fn record(&self, facts: CycleFacts<'_>) -> RecordReport {
        let mut report = RecordReport::default();

        let metrics = aggregate_row(&facts);
        match self.store.insert_metrics(&metrics) {
            Ok(()) => report.metrics_inserted = true,
            Err(e) => {
                report.failed_rows += 1;
                warn!(error = %e, "Failed to insert cycle metrics");
            }
        }

        for row in container_rows(&facts, self.memory_divisor) {
            match self.store.insert_container_stat(&row) {
                Ok(()) => report.container_rows += 1,
                Err(e) => {
                    report.failed_rows += 1;
                    warn!(
                        error = %e,
                        container_id = %row.container_id,
                        "Failed to insert container stat"
                    );
                }
            }
        }

        for row in process_rows(&facts, self.memory_divisor) {
            match self.store.insert_process_stat(&row) {
                Ok(()) => report.process_rows += 1,
                Err(e) => {
                    report.failed_rows += 1;
                    warn!(error = %e, pid = row.pid, "Failed to insert process stat");
                }
            }
        }

        debug!(
            container_rows = report.container_rows,
            process_rows = report.process_rows,
            failed_rows = report.failed_rows,
            "Recorded cycle"
        );

        report
    }
}

fn aggregate_row(facts: &CycleFacts<'_>) -> MetricsRow {
    let (total_ram, free_ram, used_ram, process_count) = match &facts.snapshot.system {
        Some(system) => (
            system.total_memory,
            system.free_memory,
            system.used_memory,
            system.processes.len(),
        ),
        None => (0, 0, 0, 0),
    };

    MetricsRow {
        timestamp: facts.timestamp,
        total_ram,
        free_ram,
        used_ram,
        container_count: to_i64(facts.container_count),
        process_count: to_i64(process_count),
        deleted_count: to_i64(facts.deleted_count),
    }
}

fn container_rows(facts: &CycleFacts<'_>, divisor: i64) -> Vec<ContainerStatRow> {
    let joined = facts.classification.records.iter().filter_map(|record| {
        record.workload.as_ref().map(|process| ContainerStatRow {
            timestamp: facts.timestamp,
            container_id: record.short_id().to_string(),
            container_name: record.name.clone(),
            pid: i64::from(process.pid),
            process_name: process.name.clone(),
            ram_usage: process.resident_memory / divisor,
            cpu_usage: process.cpu_metric,
        })
    });

    let unmatched = facts
        .classification
        .unmatched
        .iter()
        .map(|process| ContainerStatRow {
            timestamp: facts.timestamp,
            container_id: format!("cont_{}", process.pid),
            container_name: UNKNOWN_CONTAINER.to_string(),
            pid: i64::from(process.pid),
            process_name: process.name.clone(),
            ram_usage: process.resident_memory / divisor,
            cpu_usage: process.cpu_metric,
        });

    joined.chain(unmatched).collect()
}

fn process_rows(facts: &CycleFacts<'_>, divisor: i64) -> Vec<ProcessStatRow> {
    facts
        .snapshot
        .system
        .iter()
        .flat_map(|system| system.processes.iter())
        .map(|process| ProcessStatRow {
            timestamp: facts.timestamp,
            pid: i64::from(process.pid),
            name: process.name.clone(),
            ram_usage: process.resident_memory / divisor,
            cpu_usage: process.cpu_metric,
        })
        .collect()
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TierClassifier;
    use crate::config::FleetConfig;
    use crate::models::{InventoryEntry, ProcessSample, SystemSnapshot};

    fn process(pid: i32, name: &str, rss: i64) -> ProcessSample {
        ProcessSample {
            pid,
            name: name.to_string(),
            state: 0,
            resident_memory: rss,
            virtual_memory: 0,
            cpu_metric: 5,
            memory_percent: 0,
        }
    }

    fn classification(processes: &[ProcessSample]) -> Classification {
        TierClassifier::from_config(&FleetConfig::default()).classify(
            vec![
                InventoryEntry::new("fedcba9876543210", "polinux/stress", "so1_high_1"),
                InventoryEntry::new("0123456789abcdef", "alpine", "so1_low_1"),
            ],
            processes,
        )
    }

    #[test]
    fn test_full_cycle_rows() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let recorder = MetricsRecorder::new(store.clone());

        let workloads = vec![
            process(10, "sleep", 700),
            process(11, "stress", 9000),
            process(12, "stress", 8000),
        ];
        let snapshot = CycleSnapshot {
            system: Some(SystemSnapshot {
                total_memory: 1000,
                free_memory: 400,
                used_memory: 600,
                processes: vec![process(1, "systemd", 10), process(10, "sleep", 700)],
            }),
            containers: Some(workloads.clone()),
        };
        let classification = classification(&workloads);

        let report = recorder.record(CycleFacts {
            timestamp: 42,
            snapshot: &snapshot,
            classification: &classification,
            container_count: 2,
            deleted_count: 0,
        });

        assert!(report.metrics_inserted);
        assert_eq!(report.container_rows, 3);
        assert_eq!(report.process_rows, 2);
        assert_eq!(report.failed_rows, 0);

        let metrics = store.recent_metrics(1).unwrap();
        assert_eq!(metrics[0].process_count, 2);
        assert_eq!(metrics[0].used_ram, 600);

        let stats = store.recent_container_stats(10).unwrap();
        // newest first: the unmatched workload was inserted last
        assert_eq!(stats[0].container_id, "cont_12");
        assert_eq!(stats[0].container_name, UNKNOWN_CONTAINER);
        assert_eq!(stats[1].container_id, "0123456789ab");
        assert_eq!(stats[1].process_name, "sleep");
        assert_eq!(stats[1].ram_usage, 700);
        assert_eq!(stats[2].container_id, "fedcba987654");
        assert_eq!(stats[2].pid, 11);
    }

    #[test]
    fn test_memory_divisor_scales_stat_rows_only() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let recorder = MetricsRecorder::new(store.clone()).with_memory_divisor(1024);

        let workloads = vec![process(10, "sleep", 4096), process(11, "stress", 1_048_576)];
        let snapshot = CycleSnapshot {
            system: Some(SystemSnapshot {
                total_memory: 16_384_000,
                free_memory: 8_192_000,
                used_memory: 8_192_000,
                processes: vec![process(1, "systemd", 2047)],
            }),
            containers: Some(workloads.clone()),
        };
        let classification = classification(&workloads);

        recorder.record(CycleFacts {
            timestamp: 3,
            snapshot: &snapshot,
            classification: &classification,
            container_count: 2,
            deleted_count: 0,
        });

        let metrics = &store.recent_metrics(1).unwrap()[0];
        assert_eq!(metrics.total_ram, 16_384_000);

        let mut container_ram: Vec<i64> = store
            .recent_container_stats(10)
            .unwrap()
            .iter()
            .map(|r| r.ram_usage)
            .collect();
        container_ram.sort_unstable();
        assert_eq!(container_ram, vec![4, 1024]);

        // integer division truncates
        assert_eq!(store.recent_process_stats(1).unwrap()[0].ram_usage, 1);
    }

    #[test]
    fn test_unreadable_system_snapshot_still_records_metrics() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let recorder = MetricsRecorder::new(store.clone());

        let workloads = vec![process(10, "sleep", 700)];
        let snapshot = CycleSnapshot {
            system: None,
            containers: Some(workloads.clone()),
        };
        let classification = classification(&workloads);

        let report = recorder.record(CycleFacts {
            timestamp: 7,
            snapshot: &snapshot,
            classification: &classification,
            container_count: 2,
            deleted_count: 1,
        });

        assert!(report.metrics_inserted);
        assert_eq!(report.process_rows, 0);

        let row = &store.recent_metrics(1).unwrap()[0];
        assert_eq!(row.total_ram, 0);
        assert_eq!(row.free_ram, 0);
        assert_eq!(row.used_ram, 0);
        assert_eq!(row.process_count, 0);
        assert_eq!(row.container_count, 2);
        assert_eq!(row.deleted_count, 1);
    }

    #[test]
    fn test_failed_inserts_do_not_abort_cycle() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        store
            .conn()
            .execute_batch("DROP TABLE container_stats;")
            .unwrap();
        let recorder = MetricsRecorder::new(store.clone());

        let workloads = vec![process(10, "sleep", 700), process(11, "stress", 900)];
        let snapshot = CycleSnapshot {
            system: Some(SystemSnapshot {
                total_memory: 1,
                free_memory: 1,
                used_memory: 0,
                processes: vec![process(1, "init", 1)],
            }),
            containers: Some(workloads.clone()),
        };
        let classification = classification(&workloads);

        let report = recorder.record(CycleFacts {
            timestamp: 9,
            snapshot: &snapshot,
            classification: &classification,
            container_count: 2,
            deleted_count: 0,
        });

        assert!(report.metrics_inserted);
        assert_eq!(report.container_rows, 0);
        assert_eq!(report.failed_rows, 2);
        assert_eq!(report.process_rows, 1);
    }
}
