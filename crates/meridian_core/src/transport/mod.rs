//! Collaborator capabilities the aggregation core depends on.
//!
//! The core never talks to a cluster membership protocol directly. It sees
//! two seams:
//!
//! - [`ManagerRouter`] delivers a [`ManagerCommand`] to the manager that
//!   owns the command's partition key, wherever that manager lives.
//! - [`PubSub`] fans topic messages out to subscribers; the topic of a
//!   partition is its key name.
//!
//! In-process implementations ([`RingRouter`], [`LocalPubSub`]) back both
//! single-node tests and multi-node clusters hosted in one process.

mod hash_ring;
mod pubsub;
mod router;

pub use hash_ring::HashRing;
pub use pubsub::LocalPubSub;
pub use router::RingRouter;

use crate::error::AggregationError;
use crate::manager::ManagerCommand;
use crate::types::{RawPosition, RegionBatch, SubscriberId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Message published on a partition topic.
#[derive(Debug, Clone)]
pub enum TopicMessage {
    /// A raw update, published by a leaf partition as soon as it arrives
    Position(RawPosition),
    /// A summary partition's clustered output, published every tick
    Batch(Arc<RegionBatch>),
}

/// Consistent-hash routed delivery to the owning region manager.
///
/// Implementations must pick the owner purely from
/// `command.routing_key().name()` so every node agrees, and must not block
/// waiting for mailbox capacity.
#[async_trait]
pub trait ManagerRouter: Send + Sync + std::fmt::Debug {
    async fn route(&self, command: ManagerCommand) -> Result<(), AggregationError>;
}

/// Topic-keyed publish/subscribe.
///
/// Delivery is best-effort: a subscriber whose sink is full misses the
/// message.
pub trait PubSub: Send + Sync + std::fmt::Debug {
    fn publish(&self, topic: &str, message: TopicMessage);
    fn subscribe(&self, topic: &str, subscriber: SubscriberId, sink: mpsc::Sender<TopicMessage>);
    fn unsubscribe(&self, topic: &str, subscriber: SubscriberId);
}
