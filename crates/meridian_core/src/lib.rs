//! # Meridian Core
//!
//! Distributed aggregation of moving positions over a hierarchical spatial
//! grid, built as message-passing actors on Tokio.
//!
//! ## Architecture Overview
//!
//! - **Geo functions** ([`geo`]): point to partition, viewport to covering
//!   partitions, partition to box, grid clustering.
//! - **Partitions** ([`partition`]): a [`Region`] per occupied max-zoom cell
//!   holding raw positions, a [`SummaryRegion`] per occupied cell above it
//!   holding clustered child output. Every partition ticks, sweeps expired
//!   entries, publishes to its topic and reports upward.
//! - **Region managers** ([`manager`]): one per node, owning the partitions
//!   the hash ring assigns to it and forwarding child batches to parents.
//! - **Subscribers** ([`subscriber`]): one per client, following the topics
//!   that cover its viewport and batching what they publish.
//! - **Transport** ([`transport`]): the routing and pub/sub seams, with
//!   in-process implementations.
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use meridian_core::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = AggregationSettings::default();
//!     let pubsub: Arc<dyn PubSub> = Arc::new(LocalPubSub::new());
//!
//!     let (handle, mailbox) = manager_channel(NodeId::new("node-0"), settings.mailbox_capacity);
//!     let router: Arc<dyn ManagerRouter> = Arc::new(RingRouter::new(64, [handle]));
//!     let _manager = RegionManager::spawn(mailbox, settings.clone(), router.clone(), pubsub.clone());
//!
//!     let (updates_tx, mut updates) = tokio::sync::mpsc::channel(16);
//!     let subscriber = PositionSubscriber::spawn(&settings, pubsub, updates_tx);
//!     subscriber
//!         .update_viewport(BoundingBox::from_bbox([5.0, 5.0, 15.0, 15.0]))
//!         .await?;
//!
//!     let client = RegionManagerClient::new(&settings, router);
//!     client
//!         .update_position(RawPosition::new("u1", 0, GeoPoint::new(10.0, 10.0)))
//!         .await?;
//!
//!     if let Some(update) = updates.recv().await {
//!         println!("{} points in view", update.points.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod geo;
pub mod manager;
pub mod partition;
pub mod scheduler;
pub mod settings;
pub mod subscriber;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub use client::RegionManagerClient;
pub use error::AggregationError;
pub use geo::GeoFunctions;
pub use manager::{manager_channel, ManagerCommand, ManagerHandle, ManagerMailbox, ManagerStatsSnapshot, RegionManager};
pub use partition::{Partition, PartitionKind, PartitionMessage, Region, SummaryRegion, TickOutcome};
pub use scheduler::{schedule_repeating, TickHandle};
pub use settings::{AggregationSettings, MAX_SUPPORTED_ZOOM};
pub use subscriber::{PositionSubscriber, SubscriberCommand, SubscriberHandle, ViewportChange};
pub use transport::{HashRing, LocalPubSub, ManagerRouter, PubSub, RingRouter, TopicMessage};
pub use types::*;
