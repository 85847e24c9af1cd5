//! Actor-level scenarios for the aggregation core.
//!
//! These run whole managers, partitions and subscribers on a paused Tokio
//! clock, so expiry and tick timing are exact:
//! - Partition lifecycle under a manager (creation, expiry, restart)
//! - Routing over the hash ring and up the partition hierarchy
//! - Viewport changes and subscriber batching
//! - End-to-end visibility and clustering

#[cfg(test)]
pub mod support;
