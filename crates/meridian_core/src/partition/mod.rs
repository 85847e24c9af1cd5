//! # Partitions
//!
//! A partition is the actor owning one [`RegionKey`]. Leaf partitions
//! ([`Region`]) live at the maximum zoom and hold raw positions; summary
//! partitions ([`SummaryRegion`]) live above them and hold the latest
//! batch of each child.
//!
//! Every partition runs the same loop: apply messages in arrival order,
//! and on each tick sweep expired entries, publish, and report a batch to
//! the owning manager for routing to the parent. A tick that leaves the
//! partition empty stops it. Before the task exits it closes its mailbox
//! and hands anything still queued back to the manager, which replays it
//! into a fresh partition, so an update racing a stop is never lost.

mod entries;
mod region;
mod summary;

pub use entries::ExpiringEntries;
pub use region::Region;
pub use summary::SummaryRegion;

use crate::error::AggregationError;
use crate::scheduler::{schedule_repeating, TickHandle};
use crate::settings::AggregationSettings;
use crate::types::{RawPosition, RegionBatch, RegionKey};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Messages a partition mailbox carries.
#[derive(Debug, Clone)]
pub enum PartitionMessage {
    Position(RawPosition),
    ChildBatch(RegionBatch),
    Tick,
}

impl PartitionMessage {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            PartitionMessage::Position(_) => "position",
            PartitionMessage::ChildBatch(_) => "child batch",
            PartitionMessage::Tick => "tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Leaf,
    Summary,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Leaf => f.write_str("region"),
            PartitionKind::Summary => f.write_str("summary"),
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// The partition's current points, reported upward.
    pub batch: RegionBatch,
    /// Entries swept by this tick.
    pub expired: usize,
    /// Nothing is left; the partition stops after reporting.
    pub exhausted: bool,
}

/// State machine for one partition, driven by [`run_partition`].
pub trait Partition: Send + 'static {
    fn key(&self) -> &RegionKey;

    fn kind(&self) -> PartitionKind;

    /// Applies a non-tick message.
    fn accept(&mut self, message: PartitionMessage, now: Instant) -> Result<(), AggregationError>;

    /// Sweeps, publishes, and builds the batch for the parent.
    fn tick(&mut self, now: Instant) -> TickOutcome;
}

/// What a partition tells its manager.
#[derive(Debug)]
pub(crate) enum ChildReport {
    Batch(RegionBatch),
    Stopped {
        key: RegionKey,
        kind: PartitionKind,
        generation: u64,
        leftovers: Vec<PartitionMessage>,
    },
}

/// A manager's reference to a running partition.
#[derive(Debug)]
pub(crate) struct PartitionHandle {
    pub sender: mpsc::Sender<PartitionMessage>,
    pub generation: u64,
    pub kind: PartitionKind,
    pub task: JoinHandle<()>,
}

/// Starts a partition task with its tick timer. The first tick fires half
/// an interval in, so fresh partitions publish promptly.
pub(crate) fn spawn_partition<P: Partition>(
    partition: P,
    settings: &AggregationSettings,
    generation: u64,
    reports: mpsc::UnboundedSender<ChildReport>,
) -> PartitionHandle {
    let kind = partition.kind();
    let (sender, mailbox) = mpsc::channel(settings.mailbox_capacity);
    let ticks = schedule_repeating(
        settings.summary_interval / 2,
        settings.summary_interval,
        &sender,
        PartitionMessage::Tick,
    );
    let task = tokio::spawn(run_partition(partition, mailbox, ticks, generation, reports));
    PartitionHandle {
        sender,
        generation,
        kind,
        task,
    }
}

/// Reports `Stopped` on every exit path, unwinding included, so the
/// manager never keeps a handle to a dead partition.
struct ExitReport {
    key: RegionKey,
    kind: PartitionKind,
    generation: u64,
    reports: mpsc::UnboundedSender<ChildReport>,
    leftovers: Option<Vec<PartitionMessage>>,
}

impl Drop for ExitReport {
    fn drop(&mut self) {
        let _ = self.reports.send(ChildReport::Stopped {
            key: self.key,
            kind: self.kind,
            generation: self.generation,
            leftovers: self.leftovers.take().unwrap_or_default(),
        });
    }
}

async fn run_partition<P: Partition>(
    mut partition: P,
    mut mailbox: mpsc::Receiver<PartitionMessage>,
    mut ticks: TickHandle,
    generation: u64,
    reports: mpsc::UnboundedSender<ChildReport>,
) {
    let key = *partition.key();
    let kind = partition.kind();
    let mut exit = ExitReport {
        key,
        kind,
        generation,
        reports: reports.clone(),
        leftovers: None,
    };
    debug!(partition = %key, %kind, generation, "Partition started");

    while let Some(message) = mailbox.recv().await {
        let now = Instant::now();
        if !matches!(message, PartitionMessage::Tick) {
            if let Err(e) = partition.accept(message, now) {
                warn!(partition = %key, error = %e, "Discarding message");
            }
            continue;
        }

        let outcome = partition.tick(now);
        trace!(
            partition = %key,
            points = outcome.batch.points.len(),
            expired = outcome.expired,
            "Tick"
        );
        if reports.send(ChildReport::Batch(outcome.batch)).is_err() {
            break;
        }
        if outcome.exhausted {
            ticks.cancel();
            mailbox.close();
            let mut leftovers = Vec::new();
            while let Ok(message) = mailbox.try_recv() {
                if !matches!(message, PartitionMessage::Tick) {
                    leftovers.push(message);
                }
            }
            debug!(partition = %key, leftovers = leftovers.len(), "Partition empty, stopping");
            exit.leftovers = Some(leftovers);
            return;
        }
    }

    ticks.cancel();
    debug!(partition = %key, "Partition mailbox closed");
}
