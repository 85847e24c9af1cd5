//! # Meridian Node
//!
//! Runs the aggregation core as a set of cluster nodes inside one process
//! and puts a client-facing boundary in front of it.
//!
//! - [`LocalCluster`] starts one region manager per node behind a shared
//!   hash-ring router and pub/sub.
//! - [`ClientSession`] turns validated [`ClientEvent`]s into position
//!   updates and viewport changes, and yields batched updates back.
//! - [`BotFleet`] drives the cluster with simulated users.

pub mod bots;
pub mod cluster;
pub mod config;
pub mod error;
pub mod session;
pub mod shutdown;

pub use bots::{BotFleet, Walker};
pub use cluster::{ClusterStats, LocalCluster};
pub use config::{BotConfig, ClusterConfig};
pub use error::NodeError;
pub use session::{ClientEvent, ClientSession};
pub use shutdown::ShutdownState;
