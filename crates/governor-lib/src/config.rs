//! Governor configuration
//!
//! Paths, capacity ceilings, markers and periods are carried in a single
//! [`FleetConfig`] value that is handed to the scheduler at construction.
//! It is loaded from an optional file followed by `FLEET_*` environment
//! variables.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "FLEET";

/// Keys that are parsed as comma-separated lists when set from the environment
const LIST_KEYS: &[&str] = &[
    "low_markers",
    "high_markers",
    "infrastructure_markers",
    "workload_process_markers",
    "startup_hooks",
    "teardown_hooks",
];

/// Fleet governor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Host name attached to structured log events
    pub node_name: String,

    /// System-wide process/memory snapshot document
    pub system_snapshot_path: PathBuf,
    /// Container-process snapshot document
    pub container_snapshot_path: PathBuf,
    /// SQLite metrics store
    pub database_path: PathBuf,

    pub monitor_interval_secs: u64,
    pub provision_interval_secs: u64,

    /// Retention capacity of the `low` tier
    pub low_capacity: usize,
    /// Retention capacity of the `high` tier
    pub high_capacity: usize,
    /// Total governed population above which the emergency trim runs
    pub max_governed: usize,

    /// Image substrings marking lightweight containers
    pub low_markers: Vec<String>,
    /// Image substrings marking stress/heavy containers
    pub high_markers: Vec<String>,
    /// Name or image substrings of containers the governor must never touch
    pub infrastructure_markers: Vec<String>,
    /// Process name substrings identifying workload processes
    pub workload_process_markers: Vec<String>,

    /// Divides resident memory before it is stored in stat rows; 1024 turns
    /// the kernel's KiB figures into MiB
    pub stat_memory_divisor: i64,

    /// Container runtime CLI
    pub runtime_binary: String,
    /// Upper bound for any external command
    pub command_timeout_secs: u64,

    /// Command line that creates new containers, run through `sh -c`
    pub provision_command: Option<String>,
    /// Command lines run once before the first cycle
    pub startup_hooks: Vec<String>,
    /// Command lines run last during teardown
    pub teardown_hooks: Vec<String>,

    /// Port for the health and Prometheus endpoint
    pub api_port: u16,
    /// Depth of the fleet owner's command queue
    pub queue_depth: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            node_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            system_snapshot_path: PathBuf::from("/proc/sysinfo_so1_202300539"),
            container_snapshot_path: PathBuf::from("/proc/continfo_so1_202300539"),
            database_path: PathBuf::from("./metrics.db"),
            monitor_interval_secs: 20,
            provision_interval_secs: 60,
            low_capacity: 3,
            high_capacity: 2,
            max_governed: 10,
            low_markers: vec!["alpine".to_string()],
            high_markers: vec!["stress".to_string()],
            infrastructure_markers: vec!["grafana".to_string()],
            workload_process_markers: vec!["stress".to_string(), "sleep".to_string()],
            stat_memory_divisor: 1,
            runtime_binary: "docker".to_string(),
            command_timeout_secs: 30,
            provision_command: None,
            startup_hooks: Vec::new(),
            teardown_hooks: Vec::new(),
            api_port: 8080,
            queue_depth: 8,
        }
    }
}

impl FleetConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut env = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let loaded: FleetConfig = builder.add_source(env).build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.monitor_interval_secs == 0 || self.provision_interval_secs == 0 {
            return Err(FleetError::InvalidConfig(
                "intervals must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(FleetError::InvalidConfig(
                "command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.stat_memory_divisor <= 0 {
            return Err(FleetError::InvalidConfig(
                "stat_memory_divisor must be greater than zero".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(FleetError::InvalidConfig(
                "queue_depth must be greater than zero".to_string(),
            ));
        }

        let marker_sets = [
            ("low_markers", &self.low_markers),
            ("high_markers", &self.high_markers),
            ("infrastructure_markers", &self.infrastructure_markers),
            ("workload_process_markers", &self.workload_process_markers),
        ];
        for (key, markers) in marker_sets {
            if markers.iter().any(|m| m.trim().is_empty()) {
                return Err(FleetError::InvalidConfig(format!(
                    "{key} contains an empty marker"
                )));
            }
        }

        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn provision_interval(&self) -> Duration {
        Duration::from_secs(self.provision_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_matches_fleet_limits() {
        let config = FleetConfig::default();
        assert_eq!(config.low_capacity, 3);
        assert_eq!(config.high_capacity, 2);
        assert_eq!(config.max_governed, 10);
        assert_eq!(config.monitor_interval(), Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = FleetConfig {
            monitor_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FleetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_memory_divisor() {
        let config = FleetConfig {
            stat_memory_divisor: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stat_memory_divisor"));
    }

    #[test]
    fn test_validate_rejects_empty_marker() {
        let config = FleetConfig {
            infrastructure_markers: vec!["grafana".to_string(), " ".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("infrastructure_markers"));
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"low_capacity": 4, "database_path": "/tmp/fleet.db"}}"#
        )
        .unwrap();

        let config = FleetConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.low_capacity, 4);
        assert_eq!(config.database_path, PathBuf::from("/tmp/fleet.db"));
        assert_eq!(config.high_capacity, 2);
        assert_eq!(config.runtime_binary, "docker");
    }
}
