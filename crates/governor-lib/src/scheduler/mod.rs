//! Cycle scheduling
//!
//! Two periodic triggers feed a single command queue: one asks for a
//! monitoring cycle, the other for a provisioning round. The [`FleetOwner`]
//! drains the queue one command at a time, so monitor and provision work
//! never overlap. On shutdown both triggers stop, the owner finishes whatever
//! it is running and then tears the fleet down.

mod owner;


pub use owner::{CycleReport, FleetOwner, TeardownReport};

use crate::config::FleetConfig;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work items accepted by the fleet owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetCommand {
    Monitor,
    Provision,
}

impl FleetCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetCommand::Monitor => "monitor",
            FleetCommand::Provision => "provision",
        }
    }
}

/// Wires the periodic triggers to a fleet owner
pub struct Scheduler {
    owner: FleetOwner,
    monitor_interval: Duration,
    provision_interval: Duration,
    queue_depth: usize,
}

impl Scheduler {
    pub fn new(config: &FleetConfig, owner: FleetOwner) -> Self {
        Self {
            owner,
            monitor_interval: config.monitor_interval(),
            provision_interval: config.provision_interval(),
            queue_depth: config.queue_depth,
        }
    }

    /// Spawn the owner and both triggers
    ///
    /// The first monitoring cycle is requested immediately; the first
    /// provisioning round one full period later.
    pub fn start(self) -> SchedulerHandle {
        let (commands_tx, commands_rx) = mpsc::channel(self.queue_depth);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            monitor_interval_secs = self.monitor_interval.as_secs(),
            provision_interval_secs = self.provision_interval.as_secs(),
            "Starting fleet scheduler"
        );

        let owner = tokio::spawn(self.owner.run(commands_rx, shutdown_tx.subscribe()));

        let monitor = tokio::spawn(run_trigger(
            FleetCommand::Monitor,
            interval(self.monitor_interval),
            commands_tx.clone(),
            shutdown_tx.subscribe(),
        ));
        let provision = tokio::spawn(run_trigger(
            FleetCommand::Provision,
            interval_at(
                Instant::now() + self.provision_interval,
                self.provision_interval,
            ),
            commands_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        SchedulerHandle {
            commands: commands_tx,
            shutdown: shutdown_tx,
            owner,
            triggers: vec![monitor, provision],
        }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    commands: mpsc::Sender<FleetCommand>,
    shutdown: broadcast::Sender<()>,
    owner: JoinHandle<TeardownReport>,
    triggers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Queue a command outside the periodic schedule
    pub async fn request(&self, command: FleetCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Stop both triggers, let the owner finish its current command and
    /// tear the fleet down
    pub async fn shutdown(self) -> anyhow::Result<TeardownReport> {
        // No receivers left means every task has already exited
        let _ = self.shutdown.send(());

        for trigger in self.triggers {
            trigger.await?;
        }
        drop(self.commands);

        let report = self.owner.await?;
        info!(
            removed = report.removed,
            failed = report.failed,
            "Fleet scheduler stopped"
        );
        Ok(report)
    }
}

async fn run_trigger(
    command: FleetCommand,
    mut ticker: tokio::time::Interval,
    commands: mpsc::Sender<FleetCommand>,
    mut shutdown: broadcast::Receiver<()>,
) {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                match commands.try_send(command) {
                    Ok(()) => debug!(command = command.as_str(), "Command queued"),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(command = command.as_str(), "Owner busy, skipping this tick");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    info!(command = command.as_str(), "Trigger deregistered");
}
