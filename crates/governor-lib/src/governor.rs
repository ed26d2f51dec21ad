//! Fleet governor
//!
//! Enforces per-tier capacity on the classified inventory. Within a tier,
//! members are ranked by descending estimated RAM (stable, so ties keep
//! discovery order); the first `capacity` members are retained and every
//! member past that position is stopped and removed. When the total governed
//! population exceeds `max_governed` both tiers are trimmed in the same pass
//! (the emergency path).
//!
//! The governor keeps no state between cycles.

use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::inventory::InfrastructureFilter;
use crate::models::{ContainerRecord, Tier};
use crate::runtime::ContainerRuntime;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capacity ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub low_capacity: usize,
    pub high_capacity: usize,
    pub max_governed: usize,
}

impl TierLimits {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            low_capacity: config.low_capacity,
            high_capacity: config.high_capacity,
            max_governed: config.max_governed,
        }
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        match tier {
            Tier::Low => self.low_capacity,
            Tier::High => self.high_capacity,
            Tier::Excluded => usize::MAX,
        }
    }
}

impl Default for TierLimits {
    fn default() -> Self {
        Self::from_config(&FleetConfig::default())
    }
}

/// Eviction decision for one cycle
#[derive(Debug, Clone, Default)]
pub struct EvictionPlan {
    pub emergency: bool,
    /// Candidates in eviction order: `low` tier first, lightest last
    pub candidates: Vec<ContainerRecord>,
}

/// A candidate whose eviction did not complete
#[derive(Debug)]
pub struct FailedEviction {
    pub record: ContainerRecord,
    pub error: FleetError,
}

/// Result of enforcing one plan
#[derive(Debug, Default)]
pub struct GovernorOutcome {
    pub emergency: bool,
    /// Containers whose remove command succeeded
    pub evicted: Vec<ContainerRecord>,
    pub failed: Vec<FailedEviction>,
}

impl GovernorOutcome {
    /// Number of containers actually evicted this cycle
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

/// Capacity-enforcing policy engine
pub struct FleetGovernor {
    runtime: Arc<dyn ContainerRuntime>,
    limits: TierLimits,
    infrastructure: InfrastructureFilter,
}

impl FleetGovernor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        limits: TierLimits,
        infrastructure: InfrastructureFilter,
    ) -> Self {
        Self {
            runtime,
            limits,
            infrastructure,
        }
    }

    pub fn limits(&self) -> TierLimits {
        self.limits
    }

    /// Decide which containers exceed their tier's capacity
    pub fn plan(&self, records: &[ContainerRecord]) -> EvictionPlan {
        let governed: Vec<&ContainerRecord> = records
            .iter()
            .filter(|r| r.tier.is_governed())
            .filter(|r| {
                let infra = self.infrastructure.matches(&r.name, &r.image);
                if infra {
                    warn!(
                        container = %r.name,
                        "Infrastructure container reached the governor, ignoring"
                    );
                }
                !infra
            })
            .collect();

        let emergency = governed.len() > self.limits.max_governed;
        if emergency {
            debug!(
                governed = governed.len(),
                ceiling = self.limits.max_governed,
                "Governed population above ceiling, trimming every tier"
            );
        }

        let mut candidates = Vec::new();
        for tier in [Tier::Low, Tier::High] {
            let capacity = self.limits.capacity(tier);
            let mut members: Vec<&ContainerRecord> =
                governed.iter().copied().filter(|r| r.tier == tier).collect();

            if !emergency && members.len() <= capacity {
                continue;
            }

            // Stable: equal estimates keep discovery order
            members.sort_by(|a, b| b.estimated_ram.cmp(&a.estimated_ram));
            candidates.extend(members.into_iter().skip(capacity).cloned());
        }

        EvictionPlan {
            emergency,
            candidates,
        }
    }

    /// Plan and carry out evictions, returning what was actually removed
    pub async fn enforce(&self, records: &[ContainerRecord]) -> GovernorOutcome {
        let plan = self.plan(records);
        self.execute(plan).await
    }

    /// Issue stop then remove for every candidate in the plan
    ///
    /// A candidate counts as evicted only when its remove succeeds. A failed
    /// stop is logged and the remove is still attempted.
    pub async fn execute(&self, plan: EvictionPlan) -> GovernorOutcome {
        let mut outcome = GovernorOutcome {
            emergency: plan.emergency,
            ..Default::default()
        };

        for record in plan.candidates {
            if let Err(e) = self.runtime.stop(&record.id).await {
                warn!(
                    container_id = %record.short_id(),
                    error = %e,
                    "Stop failed, attempting remove anyway"
                );
            }

            match self.runtime.remove(&record.id).await {
                Ok(()) => {
                    debug!(container_id = %record.short_id(), "Stopped and removed container");
                    outcome.evicted.push(record);
                }
                Err(error) => {
                    warn!(
                        container_id = %record.short_id(),
                        error = %error,
                        "Remove failed, container not counted as evicted"
                    );
                    outcome.failed.push(FailedEviction { record, error });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryEntry;
    use crate::runtime::InMemoryRuntime;

    const MB: i64 = 1024 * 1024;

    fn record(id: &str, image: &str, tier: Tier, ram: i64) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            image: image.to_string(),
            name: format!("so1_{id}"),
            tier,
            estimated_ram: ram,
            estimated_cpu: 0,
            workload: None,
        }
    }

    fn runtime_for(records: &[ContainerRecord]) -> Arc<InMemoryRuntime> {
        Arc::new(InMemoryRuntime::with_containers(
            records
                .iter()
                .map(|r| InventoryEntry::new(r.id.as_str(), r.image.as_str(), r.name.as_str())),
        ))
    }

    fn governor(runtime: Arc<InMemoryRuntime>) -> FleetGovernor {
        FleetGovernor::new(
            runtime,
            TierLimits::default(),
            InfrastructureFilter::new(["grafana"]),
        )
    }

    #[tokio::test]
    async fn test_keeps_heaviest_low_containers() {
        let records = vec![
            record("l1", "alpine", Tier::Low, 100 * MB),
            record("l2", "alpine", Tier::Low, 90 * MB),
            record("l3", "alpine", Tier::Low, 80 * MB),
            record("l4", "alpine", Tier::Low, 70 * MB),
            record("l5", "alpine", Tier::Low, 60 * MB),
            record("h1", "polinux/stress", Tier::High, 500 * MB),
        ];
        let runtime = runtime_for(&records);
        let outcome = governor(runtime.clone()).enforce(&records).await;

        assert_eq!(outcome.evicted_count(), 2);
        assert!(!outcome.emergency);
        assert_eq!(runtime.removed_ids(), vec!["l4".to_string(), "l5".to_string()]);
        assert_eq!(
            runtime.remaining_ids(),
            vec!["l1", "l2", "l3", "h1"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let records = vec![
            record("a", "alpine", Tier::Low, 0),
            record("b", "alpine", Tier::Low, 0),
            record("c", "alpine", Tier::Low, 0),
            record("d", "alpine", Tier::Low, 0),
        ];
        let plan = governor(runtime_for(&records)).plan(&records);

        let ids: Vec<_> = plan.candidates.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_unclassified_containers_untouched() {
        let mut records: Vec<_> = (0..6)
            .map(|i| record(&format!("x{i}"), "nginx", Tier::Excluded, i))
            .collect();
        records.push(record("h1", "polinux/stress", Tier::High, 10));

        let plan = governor(runtime_for(&records)).plan(&records);
        assert!(plan.candidates.is_empty());
        assert!(!plan.emergency);
    }

    #[test]
    fn test_emergency_path_over_ceiling() {
        let limits = TierLimits {
            low_capacity: 3,
            high_capacity: 2,
            max_governed: 4,
        };
        // Low is over capacity, high is over capacity, total over ceiling
        let records = vec![
            record("l1", "alpine", Tier::Low, 3),
            record("l2", "alpine", Tier::Low, 2),
            record("l3", "alpine", Tier::Low, 1),
            record("l4", "alpine", Tier::Low, 4),
            record("h1", "stress", Tier::High, 1),
            record("h2", "stress", Tier::High, 2),
            record("h3", "stress", Tier::High, 3),
        ];
        let gov = FleetGovernor::new(
            runtime_for(&records),
            limits,
            InfrastructureFilter::new(["grafana"]),
        );
        let plan = gov.plan(&records);

        assert!(plan.emergency);
        let ids: Vec<_> = plan.candidates.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["l3", "h1"]);
    }

    #[test]
    fn test_infrastructure_never_a_candidate() {
        let records = vec![
            record("g1", "grafana/grafana-alpine", Tier::Low, 0),
            record("l1", "alpine", Tier::Low, 5),
            record("l2", "alpine", Tier::Low, 4),
            record("l3", "alpine", Tier::Low, 3),
        ];
        let plan = governor(runtime_for(&records)).plan(&records);
        assert!(plan.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_not_counted() {
        let records = vec![
            record("l1", "alpine", Tier::Low, 4),
            record("l2", "alpine", Tier::Low, 3),
            record("l3", "alpine", Tier::Low, 2),
            record("l4", "alpine", Tier::Low, 1),
            record("l5", "alpine", Tier::Low, 0),
        ];
        let runtime = runtime_for(&records);
        runtime.fail_remove("l5");

        let outcome = governor(runtime.clone()).enforce(&records).await;

        assert_eq!(outcome.evicted_count(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].record.id, "l5");
        assert_eq!(runtime.stopped_ids(), vec!["l4".to_string(), "l5".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_stop_still_attempts_remove() {
        let records = vec![
            record("h1", "stress", Tier::High, 3),
            record("h2", "stress", Tier::High, 2),
            record("h3", "stress", Tier::High, 1),
        ];
        let runtime = runtime_for(&records);
        runtime.fail_stop("h3");

        let outcome = governor(runtime.clone()).enforce(&records).await;

        // The container is still running, so the remove is rejected
        assert_eq!(runtime.removed_ids(), vec!["h3".to_string()]);
        assert_eq!(outcome.evicted_count(), 0);
        assert_eq!(outcome.failed.len(), 1);
    }
}
