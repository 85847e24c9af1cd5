/// Consistent-hash router over region manager handles
use super::{HashRing, ManagerRouter};
use crate::error::AggregationError;
use crate::manager::{ManagerCommand, ManagerHandle};
use crate::types::{NodeId, RegionKey};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::trace;

/// Routes manager commands to the node the hash ring assigns the key to.
#[derive(Debug, Clone)]
pub struct RingRouter {
    ring: HashRing,
    managers: HashMap<NodeId, ManagerHandle>,
}

impl RingRouter {
    pub fn new(virtual_nodes: usize, managers: impl IntoIterator<Item = ManagerHandle>) -> Self {
        let managers: HashMap<NodeId, ManagerHandle> = managers
            .into_iter()
            .map(|handle| (handle.node().clone(), handle))
            .collect();
        let ring = HashRing::with_nodes(virtual_nodes, managers.keys());
        Self { ring, managers }
    }

    /// The node owning a partition.
    pub fn owner_of(&self, key: &RegionKey) -> Option<&NodeId> {
        self.ring.node_for(&key.name())
    }

    pub fn managers(&self) -> impl Iterator<Item = &ManagerHandle> {
        self.managers.values()
    }
}

#[async_trait]
impl ManagerRouter for RingRouter {
    async fn route(&self, command: ManagerCommand) -> Result<(), AggregationError> {
        let key = *command.routing_key();
        let manager = self
            .owner_of(&key)
            .and_then(|node| self.managers.get(node))
            .ok_or_else(|| AggregationError::NoRoute { key: key.name() })?;
        trace!(partition = %key, node = %manager.node(), "Routing manager command");
        manager.try_deliver(command)
    }
}
