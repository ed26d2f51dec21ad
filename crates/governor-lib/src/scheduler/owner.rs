//! Fleet owner
//!
//! The only task allowed to act on the container runtime. Monitoring cycles,
//! provisioning rounds and the final teardown all run here, one at a time,
//! in the order their commands were queued.

use super::FleetCommand;
use crate::classifier::{Classification, TierClassifier};
use crate::config::FleetConfig;
use crate::governor::{EvictionPlan, FleetGovernor, TierLimits};
use crate::health::{components, HealthRegistry};
use crate::inventory::{InfrastructureFilter, Inventory};
use crate::models::Tier;
use crate::observability::{FleetLogger, FleetMetrics};
use crate::provision::{run_hooks, Provisioner};
use crate::recorder::{CycleFacts, MetricsRecorder, RecordReport};
use crate::runtime::ContainerRuntime;
use crate::snapshot::SnapshotReader;
use crate::store::MetricsStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Summary of one monitoring cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub timestamp: i64,
    pub low: usize,
    pub high: usize,
    pub unclassified: usize,
    pub evicted: usize,
    pub failed_evictions: usize,
    pub emergency: bool,
    pub inventory_ok: bool,
    pub system_snapshot_ok: bool,
    pub container_snapshot_ok: bool,
    pub record: RecordReport,
}

/// Summary of the shutdown teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: usize,
    pub failed: usize,
    pub hooks_failed: usize,
    pub inventory_ok: bool,
}

/// Owns every component that touches the runtime or the store
pub struct FleetOwner {
    inventory: Inventory,
    snapshots: SnapshotReader,
    classifier: TierClassifier,
    governor: FleetGovernor,
    recorder: MetricsRecorder,
    provisioner: Arc<dyn Provisioner>,
    health: HealthRegistry,
    metrics: FleetMetrics,
    logger: FleetLogger,
    teardown_hooks: Vec<String>,
    command_timeout: Duration,
}

impl FleetOwner {
    pub fn new(
        config: &FleetConfig,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<MetricsStore>,
        provisioner: Arc<dyn Provisioner>,
        health: HealthRegistry,
    ) -> Self {
        let filter = InfrastructureFilter::new(&config.infrastructure_markers);

        Self {
            inventory: Inventory::new(runtime.clone(), filter.clone()),
            snapshots: SnapshotReader::new(
                &config.system_snapshot_path,
                &config.container_snapshot_path,
            ),
            classifier: TierClassifier::from_config(config),
            governor: FleetGovernor::new(runtime, TierLimits::from_config(config), filter),
            recorder: MetricsRecorder::new(store)
                .with_memory_divisor(config.stat_memory_divisor),
            provisioner,
            health,
            metrics: FleetMetrics::new(),
            logger: FleetLogger::new(&config.node_name),
            teardown_hooks: config.teardown_hooks.clone(),
            command_timeout: config.command_timeout(),
        }
    }

    /// Consume commands until shutdown is signalled or every sender is gone,
    /// then tear the fleet down
    ///
    /// Shutdown is only observed between commands; a cycle that has started
    /// always runs to completion.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<FleetCommand>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> TeardownReport {
        info!("Fleet owner started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutdown received, no further cycles will start");
                    break;
                }
                command = commands.recv() => match command {
                    Some(FleetCommand::Monitor) => {
                        self.run_cycle().await;
                    }
                    Some(FleetCommand::Provision) => {
                        self.provision().await;
                    }
                    None => {
                        debug!("Command queue closed");
                        break;
                    }
                },
            }
        }

        self.teardown().await
    }

    /// One classify, govern and record cycle
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let timestamp = chrono::Utc::now().timestamp_millis();

        let snapshot = self.snapshots.read_cycle().await;
        let system_snapshot_ok = snapshot.system.is_some();
        let container_snapshot_ok = snapshot.containers.is_some();
        if !system_snapshot_ok {
            self.metrics.inc_snapshot_failures();
        }
        if !container_snapshot_ok {
            self.metrics.inc_snapshot_failures();
        }
        if snapshot.is_complete() {
            self.health.set_healthy(components::SNAPSHOT).await;
        } else {
            self.health
                .set_degraded(components::SNAPSHOT, "snapshot document unavailable")
                .await;
        }

        let (entries, inventory_ok) = match self.inventory.running().await {
            Ok(entries) => {
                self.health.set_healthy(components::INVENTORY).await;
                (entries, true)
            }
            Err(e) => {
                warn!(error = %e, "Inventory query failed, governing nothing this cycle");
                self.metrics.inc_inventory_failures();
                self.health
                    .set_degraded(components::INVENTORY, e.to_string())
                    .await;
                (Vec::new(), false)
            }
        };

        let classification = self
            .classifier
            .classify(entries, snapshot.container_processes());
        let (low, high, unclassified) = tier_counts(&classification);
        self.metrics.set_tier_count(Tier::Low, low);
        self.metrics.set_tier_count(Tier::High, high);
        self.metrics.set_tier_count(Tier::Excluded, unclassified);

        let outcome = self.governor.enforce(&classification.records).await;
        if outcome.emergency {
            self.metrics.inc_emergency_trims();
            self.logger
                .log_emergency(low + high, self.governor.limits().max_governed);
        }
        for record in &outcome.evicted {
            self.logger.log_eviction(record);
        }
        self.metrics
            .add_evictions(outcome.evicted.len(), outcome.failed.len());
        if outcome.failed.is_empty() {
            self.health.set_healthy(components::GOVERNOR).await;
        } else {
            self.health
                .set_degraded(
                    components::GOVERNOR,
                    format!("{} evictions failed", outcome.failed.len()),
                )
                .await;
        }

        let remaining = classification.records.len() - outcome.evicted.len();
        let record = self.recorder.record(CycleFacts {
            timestamp,
            snapshot: &snapshot,
            classification: &classification,
            container_count: remaining,
            deleted_count: outcome.evicted_count(),
        });
        self.metrics.add_persistence_failures(record.failed_rows);
        if record.failed_rows == 0 {
            self.health.set_healthy(components::RECORDER).await;
        } else {
            self.health
                .set_degraded(
                    components::RECORDER,
                    format!("{} rows not persisted", record.failed_rows),
                )
                .await;
        }

        let elapsed = start.elapsed();
        self.metrics.observe_cycle(elapsed.as_secs_f64());
        self.logger.log_cycle(
            low,
            high,
            unclassified,
            outcome.evicted.len(),
            elapsed.as_millis(),
        );

        CycleReport {
            timestamp,
            low,
            high,
            unclassified,
            evicted: outcome.evicted.len(),
            failed_evictions: outcome.failed.len(),
            emergency: outcome.emergency,
            inventory_ok,
            system_snapshot_ok,
            container_snapshot_ok,
            record,
        }
    }

    /// Invoke the provisioning trigger once
    pub async fn provision(&self) -> bool {
        match self.provisioner.provision().await {
            Ok(()) => {
                self.metrics.record_provisioning(true);
                self.health.set_healthy(components::PROVISIONER).await;
                true
            }
            Err(e) => {
                warn!(error = %e, "Provisioning failed");
                self.metrics.record_provisioning(false);
                self.health
                    .set_degraded(components::PROVISIONER, e.to_string())
                    .await;
                false
            }
        }
    }

    /// Stop and remove every governed container, then run teardown hooks
    ///
    /// Infrastructure and unclassified containers are left alone. Every step
    /// is best-effort.
    pub async fn teardown(&self) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self.inventory.all().await {
            Ok(entries) => {
                report.inventory_ok = true;
                let classification = self.classifier.classify(entries, &[]);
                let plan = EvictionPlan {
                    emergency: false,
                    candidates: classification.governed().cloned().collect(),
                };
                let outcome = self.governor.execute(plan).await;
                report.removed = outcome.evicted.len();
                report.failed = outcome.failed.len();
            }
            Err(e) => {
                warn!(error = %e, "Could not list containers for teardown");
            }
        }
        self.logger.log_teardown(report.removed, report.failed);

        report.hooks_failed =
            run_hooks("teardown", &self.teardown_hooks, self.command_timeout).await;

        report
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }
}

fn tier_counts(classification: &Classification) -> (usize, usize, usize) {
    (
        classification.count(Tier::Low),
        classification.count(Tier::High),
        classification.count(Tier::Excluded),
    )
}
