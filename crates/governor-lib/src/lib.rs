//! Fleet governor library
//!
//! This crate provides the core functionality for:
//! - Reading kernel-exposed system and container-process snapshots
//! - Classifying running containers into retention tiers
//! - Evicting containers beyond each tier's capacity
//! - Persisting per-cycle metrics into SQLite
//! - Scheduling monitor and provisioning work on a single owner task
//! - Health checks and observability

pub mod classifier;
pub mod config;
pub mod error;
pub mod governor;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod provision;
pub mod recorder;
pub mod runtime;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use config::FleetConfig;
pub use error::{FleetError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{FleetLogger, FleetMetrics};
pub use scheduler::{FleetCommand, FleetOwner, Scheduler, SchedulerHandle};
pub use store::{MetricsStore, MetricsSummary};
