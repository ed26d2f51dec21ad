//! In-memory container runtime
//!
//! Keeps a container table in process memory and records every call made
//! against it. Used to drive the governor, classifier and scheduler without
//! spawning processes.

use super::ContainerRuntime;
use crate::error::{FleetError, Result};
use crate::models::InventoryEntry;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// A call issued against the in-memory runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    ListRunning,
    ListAll,
    Stop(String),
    Remove(String),
}

#[derive(Debug)]
struct FakeContainer {
    entry: InventoryEntry,
    running: bool,
}

#[derive(Debug, Default)]
struct State {
    containers: Vec<FakeContainer>,
    calls: Vec<RuntimeCall>,
    failing_stop: HashSet<String>,
    failing_remove: HashSet<String>,
    list_fails: bool,
}

/// Container runtime kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    state: Mutex<State>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runtime with the given containers running, in discovery order
    pub fn with_containers(entries: impl IntoIterator<Item = InventoryEntry>) -> Self {
        let runtime = Self::new();
        for entry in entries {
            runtime.add(entry);
        }
        runtime
    }

    /// Add a running container
    pub fn add(&self, entry: InventoryEntry) {
        self.lock().containers.push(FakeContainer {
            entry,
            running: true,
        });
    }

    /// Make `stop` fail for an id
    pub fn fail_stop(&self, id: &str) {
        self.lock().failing_stop.insert(id.to_string());
    }

    /// Make `remove` fail for an id
    pub fn fail_remove(&self, id: &str) {
        self.lock().failing_remove.insert(id.to_string());
    }

    /// Make every listing call fail
    pub fn fail_listing(&self, fail: bool) {
        self.lock().list_fails = fail;
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Ids that received a stop call
    pub fn stopped_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Stop(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids that received a remove call
    pub fn removed_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Remove(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids of containers still present (running or stopped)
    pub fn remaining_ids(&self) -> Vec<String> {
        self.lock()
            .containers
            .iter()
            .map(|c| c.entry.id.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list_running(&self) -> Result<Vec<InventoryEntry>> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::ListRunning);
        if state.list_fails {
            return Err(FleetError::runtime("ps", "listing disabled"));
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| c.running)
            .map(|c| c.entry.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<InventoryEntry>> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::ListAll);
        if state.list_fails {
            return Err(FleetError::runtime("ps -a", "listing disabled"));
        }
        Ok(state.containers.iter().map(|c| c.entry.clone()).collect())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Stop(id.to_string()));
        if state.failing_stop.contains(id) {
            return Err(FleetError::runtime(format!("stop {id}"), "injected failure"));
        }
        match state.containers.iter_mut().find(|c| c.entry.id == id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(FleetError::runtime(
                format!("stop {id}"),
                "no such container",
            )),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(id.to_string()));
        if state.failing_remove.contains(id) {
            return Err(FleetError::runtime(format!("rm {id}"), "injected failure"));
        }
        match state.containers.iter().position(|c| c.entry.id == id) {
            Some(idx) if !state.containers[idx].running => {
                state.containers.remove(idx);
                Ok(())
            }
            Some(_) => Err(FleetError::runtime(
                format!("rm {id}"),
                "container is running",
            )),
            None => Err(FleetError::runtime(format!("rm {id}"), "no such container")),
        }
    }
}
