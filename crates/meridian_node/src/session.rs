//! Client sessions: the boundary between one connected client and the
//! aggregation core.
//!
//! Inbound events are validated here, so nothing malformed reaches a
//! partition. Outbound, the session's subscriber batches whatever its
//! viewport topics publish into [`SubscriberUpdate`]s.

use crate::error::NodeError;
use meridian_core::utils::current_timestamp_millis;
use meridian_core::{
    AggregationSettings, BoundingBox, GeoPoint, PositionSubscriber, PubSub, RawPosition, RegionManagerClient,
    SubscriberHandle, SubscriberUpdate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// The user is now at `position`
    UserMoved { position: GeoPoint },
    /// The user is looking at `area`
    ViewingArea { area: BoundingBox },
}

/// One connected client.
///
/// Dropping the session stops its subscriber, which leaves every topic it
/// was following.
pub struct ClientSession {
    user_id: String,
    client: RegionManagerClient,
    subscriber: SubscriberHandle,
    updates: mpsc::Receiver<SubscriberUpdate>,
}

impl ClientSession {
    pub fn new(
        user_id: impl Into<String>,
        client: RegionManagerClient,
        settings: &AggregationSettings,
        pubsub: Arc<dyn PubSub>,
    ) -> Self {
        let (updates_tx, updates) = mpsc::channel(settings.mailbox_capacity);
        let subscriber = PositionSubscriber::spawn(settings, pubsub, updates_tx);
        let user_id = user_id.into();
        debug!(user = %user_id, subscriber = %subscriber.id(), "Session opened");
        Self {
            user_id,
            client,
            subscriber,
            updates,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Applies one client event. Invalid events are logged and rejected;
    /// the session stays usable either way.
    pub async fn handle_event(&self, event: ClientEvent) -> Result<(), NodeError> {
        let result = match event {
            ClientEvent::UserMoved { position } => self.user_moved(position).await,
            ClientEvent::ViewingArea { area } => self.viewing_area(area).await,
        };
        if let Err(e) = &result {
            warn!(user = %self.user_id, error = %e, "Client event discarded");
        }
        result
    }

    /// Next batched update for this client, or `None` once the subscriber is gone.
    pub async fn next_update(&mut self) -> Option<SubscriberUpdate> {
        self.updates.recv().await
    }

    /// An update if one is already waiting.
    pub fn try_next_update(&mut self) -> Option<SubscriberUpdate> {
        self.updates.try_recv().ok()
    }

    async fn user_moved(&self, position: GeoPoint) -> Result<(), NodeError> {
        validate_point(&position)?;
        let update = RawPosition::new(self.user_id.clone(), current_timestamp_millis(), position);
        self.client.update_position(update).await?;
        Ok(())
    }

    async fn viewing_area(&self, area: BoundingBox) -> Result<(), NodeError> {
        validate_area(&area)?;
        self.subscriber.update_viewport(area).await?;
        Ok(())
    }
}

pub fn validate_point(point: &GeoPoint) -> Result<(), NodeError> {
    if !point.lat.is_finite() || !point.lng.is_finite() {
        return Err(NodeError::InvalidInput(format!("non-finite coordinate {point}")));
    }
    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(NodeError::InvalidInput(format!("latitude out of range in {point}")));
    }
    Ok(())
}

pub fn validate_area(area: &BoundingBox) -> Result<(), NodeError> {
    validate_point(&area.south_west)?;
    validate_point(&area.north_east)?;
    if area.south_west.lat > area.north_east.lat {
        return Err(NodeError::InvalidInput(format!(
            "inverted latitude range {} > {}",
            area.south_west.lat, area.north_east.lat
        )));
    }
    Ok(())
}
