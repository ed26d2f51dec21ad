//! Container runtime capability
//!
//! Every interaction with the container runtime goes through the narrow
//! [`ContainerRuntime`] trait (list, stop, remove) so the governor can be
//! driven against [`InMemoryRuntime`] in tests and against the runtime CLI
//! in production.

mod command;
mod docker;
mod memory;

pub use command::{run_command, run_shell};
pub use docker::{parse_ps_output, DockerCli};
pub use memory::{InMemoryRuntime, RuntimeCall};

use crate::error::Result;
use crate::models::InventoryEntry;

pub use async_trait::async_trait;

/// Operations the governor needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List running containers in discovery order
    async fn list_running(&self) -> Result<Vec<InventoryEntry>>;

    /// List all containers, including stopped ones
    async fn list_all(&self) -> Result<Vec<InventoryEntry>>;

    /// Stop a container; stopping an already-gone id fails harmlessly
    async fn stop(&self, id: &str) -> Result<()>;

    /// Remove a stopped container
    async fn remove(&self, id: &str) -> Result<()>;
}
