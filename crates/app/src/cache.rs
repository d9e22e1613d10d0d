//! In-process status cache backed by a `tokio` `RwLock`.

use std::collections::HashMap;

use tokio::sync::RwLock;

use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

use crate::ports::StatusCache;
use crate::snapshot::EquipmentStatusSnapshot;

/// In-memory implementation of the [`StatusCache`] port.
///
/// Snapshots are replaced wholesale on `set`, matching the cache
/// contract. Suitable for single-process deployments; a distributed
/// deployment would put an external cache behind the same port.
#[derive(Default)]
pub struct InMemoryStatusCache {
    entries: RwLock<HashMap<EquipmentId, EquipmentStatusSnapshot>>,
}

impl InMemoryStatusCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusCache for InMemoryStatusCache {
    async fn get(
        &self,
        id: &EquipmentId,
    ) -> Result<Option<EquipmentStatusSnapshot>, GatewayError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn set(&self, snapshot: EquipmentStatusSnapshot) -> Result<(), GatewayError> {
        self.entries
            .write()
            .await
            .insert(snapshot.equipment_id.clone(), snapshot);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<EquipmentStatusSnapshot>, GatewayError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}
