//! Error types for the node layer.

use meridian_core::AggregationError;

/// Failures surfaced to sessions, the bot fleet and the application.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Malformed client input; the event is discarded and the session stays usable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No node with this index exists in the cluster
    #[error("Unknown node: {0}")]
    UnknownNode(usize),

    /// Cluster configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cluster is shutting down and takes no new sessions
    #[error("Cluster is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}
