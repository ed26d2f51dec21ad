//! Tier classification and usage correlation
//!
//! Each inventory entry is evaluated once against an ordered rule list
//! (first match wins) and tagged [`Tier::Low`], [`Tier::High`] or
//! [`Tier::Excluded`].
//!
//! Resource estimates come from the container-process snapshot, which carries
//! no container identity. Governed containers are joined with workload
//! processes by position, walking the two lists in opposite directions: the
//! runtime lists newest containers first while the kernel walks the task list
//! oldest pid first, so the last governed container in discovery order gets
//! the first workload process. Containers left without a workload get a zero
//! estimate; workload processes left without a container are reported as
//! unmatched.
//!
//! The pairing is still approximate. A load generator that forks workers
//! under the same process name contributes several workload entries and
//! shifts every pairing after it.

use crate::config::FleetConfig;
use crate::models::{ContainerRecord, InventoryEntry, ProcessSample, Tier};

/// One named classification rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub name: String,
    /// Substring searched for in the image identifier
    pub image_marker: String,
    pub tier: Tier,
}

impl ClassificationRule {
    pub fn new(name: impl Into<String>, image_marker: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            image_marker: image_marker.into(),
            tier,
        }
    }

    pub fn matches(&self, image: &str) -> bool {
        image.contains(&self.image_marker)
    }
}

/// Output of one classification pass
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Every inventory entry, in discovery order
    pub records: Vec<ContainerRecord>,
    /// Workload processes that were not joined with any container
    pub unmatched: Vec<ProcessSample>,
}

impl Classification {
    /// Records the governor manages
    pub fn governed(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.records.iter().filter(|r| r.tier.is_governed())
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.records.iter().filter(|r| r.tier == tier).count()
    }
}

/// Assigns tiers and usage estimates to inventory entries
#[derive(Debug, Clone)]
pub struct TierClassifier {
    rules: Vec<ClassificationRule>,
    workload_markers: Vec<String>,
}

impl TierClassifier {
    pub fn new(rules: Vec<ClassificationRule>, workload_markers: Vec<String>) -> Self {
        Self {
            rules,
            workload_markers,
        }
    }

    /// Build the rule list from configuration: `low` markers first, then `high`
    pub fn from_config(config: &FleetConfig) -> Self {
        let low = config
            .low_markers
            .iter()
            .map(|m| ClassificationRule::new(format!("low:{m}"), m.clone(), Tier::Low));
        let high = config
            .high_markers
            .iter()
            .map(|m| ClassificationRule::new(format!("high:{m}"), m.clone(), Tier::High));

        Self::new(
            low.chain(high).collect(),
            config.workload_process_markers.clone(),
        )
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Tier for a single image identifier
    pub fn tier_for(&self, image: &str) -> Tier {
        self.rules
            .iter()
            .find(|rule| rule.matches(image))
            .map(|rule| rule.tier)
            .unwrap_or(Tier::Excluded)
    }

    /// Whether a process name identifies a workload process
    pub fn is_workload_process(&self, name: &str) -> bool {
        self.workload_markers.iter().any(|m| name.contains(m.as_str()))
    }

    /// Classify the inventory and join it with the container-process snapshot
    pub fn classify(
        &self,
        entries: Vec<InventoryEntry>,
        container_processes: &[ProcessSample],
    ) -> Classification {
        let tiers: Vec<Tier> = entries.iter().map(|e| self.tier_for(&e.image)).collect();
        let mut workloads = container_processes
            .iter()
            .filter(|p| self.is_workload_process(&p.name))
            .cloned();

        let mut paired: Vec<Option<ProcessSample>> = vec![None; entries.len()];
        for (slot, tier) in paired.iter_mut().zip(&tiers).rev() {
            if tier.is_governed() {
                *slot = workloads.next();
            }
        }

        let records = entries
            .into_iter()
            .zip(tiers)
            .zip(paired)
            .map(|((entry, tier), workload)| {
                let (estimated_ram, estimated_cpu) = workload
                    .as_ref()
                    .map(|p| (p.resident_memory, p.cpu_metric))
                    .unwrap_or((0, 0));

                ContainerRecord {
                    id: entry.id,
                    image: entry.image,
                    name: entry.name,
                    tier,
                    estimated_ram,
                    estimated_cpu,
                    workload,
                }
            })
            .collect();

        Classification {
            records,
            unmatched: workloads.collect(),
        }
    }
}
