//! # Region Manager
//!
//! One manager per node. It owns the partitions whose keys hash to its
//! node: it creates them lazily on first message, forwards each child's
//! tick batch towards the parent key through the router, and replays
//! messages that raced a partition's stop into a fresh instance.
//!
//! All sends out of the manager are non-blocking. Commands arrive on a
//! bounded mailbox; partition reports arrive on an unbounded channel whose
//! volume is bounded by the tick rate, so a manager and its partitions can
//! never wait on each other.

use crate::error::AggregationError;
use crate::partition::{
    spawn_partition, ChildReport, PartitionHandle, PartitionKind, PartitionMessage, Region, SummaryRegion,
};
use crate::settings::AggregationSettings;
use crate::transport::{ManagerRouter, PubSub};
use crate::types::{NodeId, RawPosition, RegionBatch, RegionKey};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work routed to the manager owning `key`.
#[derive(Debug, Clone)]
pub enum ManagerCommand {
    /// A raw position for the leaf partition `key`
    UpdatePosition { key: RegionKey, position: RawPosition },
    /// A child's tick batch for the summary partition `key`
    UpdateChildBatch { key: RegionKey, batch: RegionBatch },
}

impl ManagerCommand {
    /// The partition this command is for; the router hashes its name.
    pub fn routing_key(&self) -> &RegionKey {
        match self {
            ManagerCommand::UpdatePosition { key, .. } => key,
            ManagerCommand::UpdateChildBatch { key, .. } => key,
        }
    }
}

/// Live counters for one manager.
#[derive(Debug, Default)]
pub struct ManagerStats {
    positions_received: AtomicU64,
    child_batches_received: AtomicU64,
    batches_routed: AtomicU64,
    routing_failures: AtomicU64,
    messages_dropped: AtomicU64,
    partitions_started: AtomicU64,
    partitions_stopped: AtomicU64,
    active_regions: AtomicUsize,
    active_summaries: AtomicUsize,
}

/// Point-in-time copy of [`ManagerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStatsSnapshot {
    pub positions_received: u64,
    pub child_batches_received: u64,
    pub batches_routed: u64,
    pub routing_failures: u64,
    pub messages_dropped: u64,
    pub partitions_started: u64,
    pub partitions_stopped: u64,
    pub active_regions: usize,
    pub active_summaries: usize,
}

impl ManagerStats {
    pub fn snapshot(&self) -> ManagerStatsSnapshot {
        ManagerStatsSnapshot {
            positions_received: self.positions_received.load(Ordering::Relaxed),
            child_batches_received: self.child_batches_received.load(Ordering::Relaxed),
            batches_routed: self.batches_routed.load(Ordering::Relaxed),
            routing_failures: self.routing_failures.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            partitions_started: self.partitions_started.load(Ordering::Relaxed),
            partitions_stopped: self.partitions_stopped.load(Ordering::Relaxed),
            active_regions: self.active_regions.load(Ordering::Relaxed),
            active_summaries: self.active_summaries.load(Ordering::Relaxed),
        }
    }

    fn active(&self, kind: PartitionKind) -> &AtomicUsize {
        match kind {
            PartitionKind::Leaf => &self.active_regions,
            PartitionKind::Summary => &self.active_summaries,
        }
    }
}

/// Cloneable address of a running (or not yet started) manager.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    node: NodeId,
    commands: mpsc::Sender<ManagerCommand>,
    stats: Arc<ManagerStats>,
}

impl ManagerHandle {
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Queues a command without waiting. Fails when the mailbox is full or
    /// the manager has stopped.
    pub fn try_deliver(&self, command: ManagerCommand) -> Result<(), AggregationError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => AggregationError::MailboxFull {
                target: format!("manager {}", self.node),
            },
            TrySendError::Closed(_) => AggregationError::MailboxClosed {
                target: format!("manager {}", self.node),
            },
        })
    }

    pub fn stats(&self) -> ManagerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Receiving half of a manager's mailbox, consumed by [`RegionManager::spawn`].
#[derive(Debug)]
pub struct ManagerMailbox {
    node: NodeId,
    commands: mpsc::Receiver<ManagerCommand>,
    stats: Arc<ManagerStats>,
}

/// Creates a manager mailbox.
///
/// Handles exist before the manager runs so that routers spanning several
/// managers can be built first and handed to each of them.
pub fn manager_channel(node: NodeId, capacity: usize) -> (ManagerHandle, ManagerMailbox) {
    let (tx, rx) = mpsc::channel(capacity);
    let stats = Arc::new(ManagerStats::default());
    (
        ManagerHandle {
            node: node.clone(),
            commands: tx,
            stats: stats.clone(),
        },
        ManagerMailbox {
            node,
            commands: rx,
            stats,
        },
    )
}

pub struct RegionManager {
    node: NodeId,
    settings: AggregationSettings,
    router: Arc<dyn ManagerRouter>,
    pubsub: Arc<dyn PubSub>,
    children: HashMap<RegionKey, PartitionHandle>,
    next_generation: u64,
    reports: mpsc::UnboundedSender<ChildReport>,
    stats: Arc<ManagerStats>,
}

impl RegionManager {
    /// Runs the manager until every [`ManagerHandle`] for it is dropped or
    /// the returned task is aborted.
    ///
    /// The manager holds the only strong senders to its partitions'
    /// mailboxes, so once it is gone they drain what they have queued and
    /// end on their own.
    pub fn spawn(
        mailbox: ManagerMailbox,
        settings: AggregationSettings,
        router: Arc<dyn ManagerRouter>,
        pubsub: Arc<dyn PubSub>,
    ) -> JoinHandle<()> {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let manager = Self {
            node: mailbox.node,
            settings,
            router,
            pubsub,
            children: HashMap::new(),
            next_generation: 0,
            reports: reports_tx,
            stats: mailbox.stats,
        };
        tokio::spawn(manager.run(mailbox.commands, reports_rx))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ManagerCommand>,
        mut reports: mpsc::UnboundedReceiver<ChildReport>,
    ) {
        info!(node = %self.node, "🗺️ Region manager started");
        loop {
            tokio::select! {
                biased;
                Some(report) = reports.recv() => self.handle_report(report).await,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        let owned = self.children.len();
        for (_, child) in self.children.drain() {
            child.task.abort();
        }
        self.stats.active_regions.store(0, Ordering::Relaxed);
        self.stats.active_summaries.store(0, Ordering::Relaxed);
        info!(node = %self.node, partitions = owned, "Region manager stopped");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::UpdatePosition { key, position } => {
                self.stats.positions_received.fetch_add(1, Ordering::Relaxed);
                self.deliver(key, PartitionKind::Leaf, PartitionMessage::Position(position));
            }
            ManagerCommand::UpdateChildBatch { key, batch } => {
                self.stats.child_batches_received.fetch_add(1, Ordering::Relaxed);
                self.deliver(key, PartitionKind::Summary, PartitionMessage::ChildBatch(batch));
            }
        }
    }

    async fn handle_report(&mut self, report: ChildReport) {
        match report {
            ChildReport::Batch(batch) => {
                let Some(parent) = batch.key.parent() else {
                    return;
                };
                let child = batch.key;
                match self.router.route(ManagerCommand::UpdateChildBatch { key: parent, batch }).await {
                    Ok(()) => {
                        self.stats.batches_routed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.stats.routing_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(node = %self.node, partition = %child, error = %e, "Failed to route batch to parent");
                    }
                }
            }
            ChildReport::Stopped {
                key,
                kind,
                generation,
                leftovers,
            } => {
                if self.children.get(&key).map(|c| c.generation) == Some(generation) {
                    self.forget(&key);
                    debug!(node = %self.node, partition = %key, %kind, "Partition stopped");
                }
                if !leftovers.is_empty() {
                    debug!(node = %self.node, partition = %key, count = leftovers.len(), "Replaying messages");
                }
                for message in leftovers {
                    self.deliver(key, kind, message);
                }
            }
        }
    }

    /// Hands `message` to the partition for `key`, creating it if needed.
    fn deliver(&mut self, key: RegionKey, kind: PartitionKind, message: PartitionMessage) {
        let expected = if key.zoom_level == self.settings.max_zoom_depth {
            PartitionKind::Leaf
        } else {
            PartitionKind::Summary
        };
        if key.zoom_level > self.settings.max_zoom_depth || kind != expected || !key.is_valid() {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(node = %self.node, partition = %key, "Dropping {} for malformed partition key", message.describe());
            return;
        }

        let message = match self.child(key, kind).sender.try_send(message) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(node = %self.node, partition = %key, "Partition mailbox full, message dropped");
                return;
            }
            Err(TrySendError::Closed(message)) => message,
        };

        // The partition is stopping; its Stopped report will replay anything it queued.
        self.forget(&key);
        if let Err(e) = self.child(key, kind).sender.try_send(message) {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(node = %self.node, partition = %key, error = %e, "Failed to deliver to restarted partition");
        }
    }

    fn child(&mut self, key: RegionKey, kind: PartitionKind) -> &PartitionHandle {
        if !self.children.contains_key(&key) {
            let handle = self.start(key, kind);
            self.children.insert(key, handle);
        }
        &self.children[&key]
    }

    fn start(&mut self, key: RegionKey, kind: PartitionKind) -> PartitionHandle {
        self.next_generation += 1;
        self.stats.partitions_started.fetch_add(1, Ordering::Relaxed);
        self.stats.active(kind).fetch_add(1, Ordering::Relaxed);
        debug!(node = %self.node, partition = %key, %kind, generation = self.next_generation, "Starting partition");

        let reports = self.reports.clone();
        match kind {
            PartitionKind::Leaf => spawn_partition(
                Region::new(key, &self.settings, self.pubsub.clone()),
                &self.settings,
                self.next_generation,
                reports,
            ),
            PartitionKind::Summary => spawn_partition(
                SummaryRegion::new(key, &self.settings, self.pubsub.clone()),
                &self.settings,
                self.next_generation,
                reports,
            ),
        }
    }

    fn forget(&mut self, key: &RegionKey) {
        if let Some(child) = self.children.remove(key) {
            self.stats.partitions_stopped.fetch_add(1, Ordering::Relaxed);
            self.stats.active(child.kind).fetch_sub(1, Ordering::Relaxed);
        }
    }
}
