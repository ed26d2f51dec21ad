//! Snapshot reader
//!
//! Loads the two point-in-time documents exposed by the kernel producers:
//! the system-wide snapshot (memory totals plus every process) and the
//! container-process snapshot (a flat array of processes running inside
//! containers). Either document may be missing or malformed; the cycle keeps
//! going with whatever is available.

use crate::error::{FleetError, Result};
use crate::models::{ProcessSample, SystemSnapshot};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Both snapshot documents as read in one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    /// `None` when the system document was unavailable or malformed
    pub system: Option<SystemSnapshot>,
    /// `None` when the container document was unavailable or malformed
    pub containers: Option<Vec<ProcessSample>>,
}

impl CycleSnapshot {
    /// Container processes, or an empty slice when the document was unusable
    pub fn container_processes(&self) -> &[ProcessSample] {
        self.containers.as_deref().unwrap_or(&[])
    }

    pub fn is_complete(&self) -> bool {
        self.system.is_some() && self.containers.is_some()
    }
}

/// Reads snapshot documents from fixed locations
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    system_path: PathBuf,
    container_path: PathBuf,
}

impl SnapshotReader {
    pub fn new(system_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            system_path: system_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Read the system-wide snapshot
    pub async fn read_system(&self) -> Result<SystemSnapshot> {
        read_document(&self.system_path).await
    }

    /// Read the container-process snapshot
    pub async fn read_containers(&self) -> Result<Vec<ProcessSample>> {
        read_document(&self.container_path).await
    }

    /// Read both documents, degrading each failure to `None`
    pub async fn read_cycle(&self) -> CycleSnapshot {
        let system = match self.read_system().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "System snapshot unusable, continuing without it");
                None
            }
        };

        let containers = match self.read_containers().await {
            Ok(processes) => Some(processes),
            Err(e) => {
                warn!(error = %e, "Container snapshot unusable, continuing without it");
                None
            }
        };

        CycleSnapshot { system, containers }
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path)
        .await
        .map_err(|source| FleetError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), bytes = raw.len(), "Read snapshot document");

    serde_json::from_slice(&raw).map_err(|source| FleetError::MalformedSource {
        path: path.to_path_buf(),
        source,
    })
}
