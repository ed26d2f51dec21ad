//! Subcommand implementations

pub mod metrics;
pub mod stats;
