/// Entry point for position updates from connections and simulators
use crate::error::AggregationError;
use crate::geo::GeoFunctions;
use crate::manager::ManagerCommand;
use crate::settings::AggregationSettings;
use crate::transport::ManagerRouter;
use crate::types::{RawPosition, RegionKey};
use std::sync::Arc;
use tracing::trace;

/// Stateless, cloneable front door to the region managers.
///
/// Resolves the leaf partition of each update and routes it to the node
/// owning that partition. Safe to share across tasks.
#[derive(Debug, Clone)]
pub struct RegionManagerClient {
    geo: GeoFunctions,
    router: Arc<dyn ManagerRouter>,
}

impl RegionManagerClient {
    pub fn new(settings: &AggregationSettings, router: Arc<dyn ManagerRouter>) -> Self {
        Self {
            geo: GeoFunctions::new(settings),
            router,
        }
    }

    /// Routes one update to its leaf partition, returning that partition's key.
    pub async fn update_position(&self, position: RawPosition) -> Result<RegionKey, AggregationError> {
        if position.id.is_empty() {
            return Err(AggregationError::InvalidInput("position id is empty".to_string()));
        }
        if !position.position.is_valid() {
            return Err(AggregationError::InvalidInput(format!(
                "position {} for {} is out of range",
                position.position, position.id
            )));
        }

        let key = self.geo.region_for_point(position.position);
        trace!(id = %position.id, partition = %key, "Routing position");
        self.router
            .route(ManagerCommand::UpdatePosition { key, position })
            .await?;
        Ok(key)
    }
}
