//! Container inventory
//!
//! Queries the runtime for the current container set and drops every
//! infrastructure/dashboard container before anything downstream sees it.

use crate::error::Result;
use crate::models::InventoryEntry;
use crate::runtime::ContainerRuntime;
use std::sync::Arc;
use tracing::debug;

/// Recognizes infrastructure containers by name or image substring
#[derive(Debug, Clone)]
pub struct InfrastructureFilter {
    /// Lowercased markers
    markers: Vec<String>,
}

impl InfrastructureFilter {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Case-insensitive match against the container name or image
    pub fn is_infrastructure(&self, entry: &InventoryEntry) -> bool {
        self.matches(&entry.name, &entry.image)
    }

    pub fn matches(&self, name: &str, image: &str) -> bool {
        let name = name.to_lowercase();
        let image = image.to_lowercase();
        self.markers
            .iter()
            .any(|m| name.contains(m.as_str()) || image.contains(m.as_str()))
    }
}

/// Runtime-backed view of the containers the governor may act on
#[derive(Clone)]
pub struct Inventory {
    runtime: Arc<dyn ContainerRuntime>,
    filter: InfrastructureFilter,
}

impl Inventory {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, filter: InfrastructureFilter) -> Self {
        Self { runtime, filter }
    }

    /// Running containers, infrastructure excluded, in discovery order
    pub async fn running(&self) -> Result<Vec<InventoryEntry>> {
        let entries = self.runtime.list_running().await?;
        Ok(self.exclude_infrastructure(entries))
    }

    /// All containers including stopped ones, infrastructure excluded
    pub async fn all(&self) -> Result<Vec<InventoryEntry>> {
        let entries = self.runtime.list_all().await?;
        Ok(self.exclude_infrastructure(entries))
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    fn exclude_infrastructure(&self, entries: Vec<InventoryEntry>) -> Vec<InventoryEntry> {
        entries
            .into_iter()
            .filter(|entry| {
                let infra = self.filter.is_infrastructure(entry);
                if infra {
                    debug!(
                        container = %entry.name,
                        image = %entry.image,
                        "Skipping infrastructure container"
                    );
                }
                !infra
            })
            .collect()
    }
}
