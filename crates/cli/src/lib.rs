//! Offline simulator for the bucket distribution library.
//!
//! Provides commands for:
//! - Founding a simulated cluster and joining nodes
//! - Removing nodes and redistributing their buckets
//! - Running balance ticks on overloaded nodes

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
