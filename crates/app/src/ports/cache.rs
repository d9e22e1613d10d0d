//! Cache port — fast equipment-status snapshots for downstream readers.

use std::future::Future;

use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

use crate::snapshot::EquipmentStatusSnapshot;

/// Read/write access to the external status cache.
///
/// The cache is eventually consistent with the aggregates; snapshots are
/// replaced wholesale, never patched in place.
pub trait StatusCache: Send + Sync {
    /// Fetch the cached snapshot for `id`, `None` on a cold cache.
    fn get(
        &self,
        id: &EquipmentId,
    ) -> impl Future<Output = Result<Option<EquipmentStatusSnapshot>, GatewayError>> + Send;

    /// Store a snapshot, overwriting any previous one for the same id.
    fn set(
        &self,
        snapshot: EquipmentStatusSnapshot,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Fetch all cached snapshots.
    fn get_all(
        &self,
    ) -> impl Future<Output = Result<Vec<EquipmentStatusSnapshot>, GatewayError>> + Send;
}

impl<T: StatusCache> StatusCache for std::sync::Arc<T> {
    fn get(
        &self,
        id: &EquipmentId,
    ) -> impl Future<Output = Result<Option<EquipmentStatusSnapshot>, GatewayError>> + Send {
        (**self).get(id)
    }

    fn set(
        &self,
        snapshot: EquipmentStatusSnapshot,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).set(snapshot)
    }

    fn get_all(
        &self,
    ) -> impl Future<Output = Result<Vec<EquipmentStatusSnapshot>, GatewayError>> + Send {
        (**self).get_all()
    }
}
