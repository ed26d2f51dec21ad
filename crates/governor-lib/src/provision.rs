//! Provisioning trigger and lifecycle hooks
//!
//! Container creation itself is an external routine; the governor only
//! invokes it on its own period. Hooks are arbitrary command lines run once at
//! start-up and once at the end of teardown.

use crate::runtime::run_shell;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Something that creates new containers when triggered
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Run one provisioning round
    async fn provision(&self) -> crate::error::Result<()>;
}

/// Runs a configured command line through `sh -c`
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    command: Option<String>,
    timeout: Duration,
}

impl CommandProvisioner {
    pub fn new(command: Option<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self) -> crate::error::Result<()> {
        let Some(command) = &self.command else {
            info!("No provisioning command configured, skipping");
            return Ok(());
        };

        let output = run_shell(command, self.timeout).await?;
        info!(
            command = %command,
            output_lines = output.lines().count(),
            "Provisioning command finished"
        );
        Ok(())
    }
}

/// Run each hook in order, logging failures; returns the number that failed
pub async fn run_hooks(stage: &str, hooks: &[String], timeout: Duration) -> usize {
    let mut failed = 0;

    for hook in hooks {
        match run_shell(hook, timeout).await {
            Ok(_) => info!(stage = %stage, hook = %hook, "Hook completed"),
            Err(e) => {
                failed += 1;
                warn!(stage = %stage, hook = %hook, error = %e, "Hook failed");
            }
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unconfigured_provisioner_is_noop() {
        let provisioner = CommandProvisioner::new(None, Duration::from_secs(1));
        assert!(provisioner.provision().await.is_ok());
    }

    #[tokio::test]
    async fn test_provisioner_runs_command() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("provisioned");
        let provisioner = CommandProvisioner::new(
            Some(format!("touch {}", marker.display())),
            Duration::from_secs(5),
        );

        provisioner.provision().await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_hooks_continue_after_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("after");
        let hooks = vec!["exit 1".to_string(), format!("touch {}", marker.display())];

        let failed = run_hooks("teardown", &hooks, Duration::from_secs(5)).await;

        assert_eq!(failed, 1);
        assert!(marker.exists());
    }
}
