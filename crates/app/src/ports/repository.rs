//! Storage port — durable persistence for the equipment aggregate,
//! independent of the live status cache.

use std::future::Future;

use fabgate_domain::equipment::Equipment;
use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

/// Repository for persisting and loading [`Equipment`] aggregates.
pub trait EquipmentRepository: Send + Sync {
    /// Load an aggregate by id.
    fn get_by_id(
        &self,
        id: &EquipmentId,
    ) -> impl Future<Output = Result<Option<Equipment>, GatewayError>> + Send;

    /// Persist a new aggregate.
    fn add(
        &self,
        equipment: Equipment,
    ) -> impl Future<Output = Result<Equipment, GatewayError>> + Send;

    /// Persist changes to an existing aggregate.
    fn update(
        &self,
        equipment: Equipment,
    ) -> impl Future<Output = Result<Equipment, GatewayError>> + Send;

    /// Load all known aggregates.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Equipment>, GatewayError>> + Send;
}
