//! # Local Cluster
//!
//! Hosts several aggregation nodes in one process. Every node runs one
//! region manager; all of them share a pub/sub and a hash-ring router, so
//! partition ownership spreads across nodes exactly as it would across
//! machines, and any node's client can reach any partition.

use crate::config::ClusterConfig;
use crate::error::NodeError;
use crate::session::ClientSession;
use crate::shutdown::ShutdownState;
use futures::future::join_all;
use meridian_core::{
    manager_channel, AggregationSettings, LocalPubSub, ManagerHandle, ManagerStatsSnapshot, NodeId, PubSub,
    RegionManager, RegionManagerClient, RingRouter,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters summed over every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub nodes: usize,
    pub positions_received: u64,
    pub child_batches_received: u64,
    pub batches_routed: u64,
    pub routing_failures: u64,
    pub messages_dropped: u64,
    pub active_regions: usize,
    pub active_summaries: usize,
}

impl ClusterStats {
    /// Sums the live counters of `managers`.
    pub fn collect<'a>(managers: impl IntoIterator<Item = &'a ManagerHandle>) -> Self {
        let mut totals = Self::default();
        for manager in managers {
            totals.add(&manager.stats());
        }
        totals
    }

    fn add(&mut self, node: &ManagerStatsSnapshot) {
        self.nodes += 1;
        self.positions_received += node.positions_received;
        self.child_batches_received += node.child_batches_received;
        self.batches_routed += node.batches_routed;
        self.routing_failures += node.routing_failures;
        self.messages_dropped += node.messages_dropped;
        self.active_regions += node.active_regions;
        self.active_summaries += node.active_summaries;
    }
}

pub struct LocalCluster {
    config: ClusterConfig,
    pubsub: Arc<LocalPubSub>,
    router: Arc<RingRouter>,
    managers: Vec<ManagerHandle>,
    clients: Vec<RegionManagerClient>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: ShutdownState,
}

impl LocalCluster {
    /// Validates `config` and starts one region manager per node.
    pub fn start(config: ClusterConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let settings = &config.aggregation;

        let (managers, mailboxes): (Vec<_>, Vec<_>) = (0..config.nodes)
            .map(|i| manager_channel(NodeId::new(format!("node-{i}")), settings.mailbox_capacity))
            .unzip();
        let router = Arc::new(RingRouter::new(config.virtual_nodes, managers.clone()));
        let pubsub = Arc::new(LocalPubSub::new());

        let tasks = mailboxes
            .into_iter()
            .map(|mailbox| RegionManager::spawn(mailbox, settings.clone(), router.clone(), pubsub.clone()))
            .collect();
        let clients = managers
            .iter()
            .map(|_| RegionManagerClient::new(settings, router.clone()))
            .collect();

        info!(
            "🌐 Local cluster started: {} node(s), {} virtual nodes each, leaf zoom {}",
            config.nodes, config.virtual_nodes, settings.max_zoom_depth
        );
        Ok(Self {
            config,
            pubsub,
            router,
            managers,
            clients,
            tasks,
            shutdown: ShutdownState::new(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.managers.len()
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.config.aggregation
    }

    pub fn router(&self) -> &Arc<RingRouter> {
        &self.router
    }

    pub fn pubsub(&self) -> Arc<dyn PubSub> {
        self.pubsub.clone()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.clone()
    }

    /// The position client of one node.
    pub fn client(&self, node: usize) -> Result<&RegionManagerClient, NodeError> {
        self.clients.get(node).ok_or(NodeError::UnknownNode(node))
    }

    pub fn clients(&self) -> &[RegionManagerClient] {
        &self.clients
    }

    /// Opens a session for `user_id` on `node`.
    pub fn connect(&self, node: usize, user_id: impl Into<String>) -> Result<ClientSession, NodeError> {
        if self.shutdown.is_shutdown_initiated() {
            return Err(NodeError::ShuttingDown);
        }
        let client = self.client(node)?.clone();
        Ok(ClientSession::new(user_id, client, self.settings(), self.pubsub()))
    }

    pub fn node_stats(&self) -> Vec<(NodeId, ManagerStatsSnapshot)> {
        self.managers
            .iter()
            .map(|manager| (manager.node().clone(), manager.stats()))
            .collect()
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats::collect(&self.managers)
    }

    /// Stops every region manager. Their partitions drain and end once
    /// the managers are gone.
    pub async fn shutdown(self) {
        self.shutdown.initiate_shutdown();
        for task in &self.tasks {
            task.abort();
        }
        for result in join_all(self.tasks).await {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Region manager cancelled"),
                Err(e) => warn!("Region manager ended abnormally: {e}"),
            }
        }
        self.shutdown.complete_shutdown();
        info!("🧹 Local cluster stopped");
    }
}
