//! Runtime implementation backed by the docker CLI

use super::{command::run_command, ContainerRuntime};
use crate::error::Result;
use crate::models::InventoryEntry;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const PS_FORMAT: &str = "{{.ID}}|{{.Image}}|{{.Names}}";

/// Container runtime driven through `docker` (or a CLI-compatible binary)
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn ps(&self, all: bool) -> Result<Vec<InventoryEntry>> {
        let mut args = vec!["ps"];
        if all {
            args.push("-a");
        }
        args.extend(["--no-trunc", "--format", PS_FORMAT]);

        let stdout = run_command(&self.binary, &args, self.timeout).await?;
        let entries = parse_ps_output(&stdout);
        debug!(count = entries.len(), all, "Listed containers");
        Ok(entries)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running(&self) -> Result<Vec<InventoryEntry>> {
        self.ps(false).await
    }

    async fn list_all(&self) -> Result<Vec<InventoryEntry>> {
        self.ps(true).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        run_command(&self.binary, &["stop", id], self.timeout).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        run_command(&self.binary, &["rm", id], self.timeout).await?;
        Ok(())
    }
}

/// Parse `ps --format '{{.ID}}|{{.Image}}|{{.Names}}'` output
///
/// Blank lines are ignored; lines with fewer than three fields are skipped.
pub fn parse_ps_output(stdout: &str) -> Vec<InventoryEntry> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(3, '|');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(image), Some(name)) if !id.is_empty() => {
                    Some(InventoryEntry::new(id, image, name))
                }
                _ => {
                    warn!(line = %line, "Skipping unparseable container listing line");
                    None
                }
            }
        })
        .collect()
}
