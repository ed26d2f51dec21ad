//! Core data models for the fleet governor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the display form of a container id
pub const SHORT_ID_LEN: usize = 12;

/// One process entry from a kernel snapshot document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: i32,
    pub name: String,
    /// Scheduler state; absent from the container-process document
    #[serde(default)]
    pub state: i64,
    /// Resident memory as reported by the snapshot
    #[serde(rename = "rss", default)]
    pub resident_memory: i64,
    /// Virtual memory as reported by the snapshot
    #[serde(rename = "vsz", default)]
    pub virtual_memory: i64,
    #[serde(rename = "cpu", default)]
    pub cpu_metric: i64,
    /// Absent from the container-process document
    #[serde(rename = "mem_percent", default)]
    pub memory_percent: i64,
}

/// System-wide memory and process snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    #[serde(rename = "total_ram", default)]
    pub total_memory: i64,
    #[serde(rename = "free_ram", default)]
    pub free_memory: i64,
    #[serde(rename = "used_ram", default)]
    pub used_memory: i64,
    #[serde(default)]
    pub processes: Vec<ProcessSample>,
}

/// Resource tier of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    High,
    /// Present in the inventory but ignored by the governor
    #[serde(rename = "unclassified")]
    Excluded,
}

impl Tier {
    /// Whether the governor manages containers of this tier
    pub fn is_governed(&self) -> bool {
        matches!(self, Tier::Low | Tier::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::High => "high",
            Tier::Excluded => "unclassified",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running container as reported by the runtime, before classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: String,
    pub image: String,
    pub name: String,
}

impl InventoryEntry {
    pub fn new(id: impl Into<String>, image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            name: name.into(),
        }
    }

    /// Canonical truncated id used for display and persistence
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// A classified, usage-annotated container, rebuilt every cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image: String,
    pub name: String,
    pub tier: Tier,
    pub estimated_ram: i64,
    pub estimated_cpu: i64,
    /// Workload process this container was joined with, if any
    pub workload: Option<ProcessSample>,
}

impl ContainerRecord {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Aggregate metrics persisted once per cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRow {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub total_ram: i64,
    pub free_ram: i64,
    pub used_ram: i64,
    pub container_count: i64,
    pub process_count: i64,
    pub deleted_count: i64,
}

/// Per-container resource sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatRow {
    pub timestamp: i64,
    pub container_id: String,
    pub container_name: String,
    pub pid: i64,
    pub process_name: String,
    pub ram_usage: i64,
    pub cpu_usage: i64,
}

/// Per-process resource sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatRow {
    pub timestamp: i64,
    pub pid: i64,
    pub name: String,
    pub ram_usage: i64,
    pub cpu_usage: i64,
}

/// Truncate a runtime id to its display form
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates_long_ids() {
        let id = "4f1c2a9b7d3e5f60718293a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4";
        assert_eq!(short_id(id), "4f1c2a9b7d3e");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_process_sample_from_container_document() {
        // The container-process document has no state or mem_percent
        let json = r#"{"pid": 42, "name": "stress", "rss": 2048, "vsz": 8192, "cpu": 97}"#;
        let sample: ProcessSample = serde_json::from_str(json).unwrap();

        assert_eq!(sample.pid, 42);
        assert_eq!(sample.resident_memory, 2048);
        assert_eq!(sample.cpu_metric, 97);
        assert_eq!(sample.state, 0);
        assert_eq!(sample.memory_percent, 0);
    }

    #[test]
    fn test_tier_serialization() {
        assert_eq!(serde_json::to_string(&Tier::Low).unwrap(), "\"low\"");
        assert_eq!(
            serde_json::to_string(&Tier::Excluded).unwrap(),
            "\"unclassified\""
        );
        assert!(!Tier::Excluded.is_governed());
        assert!(Tier::High.is_governed());
    }
}
