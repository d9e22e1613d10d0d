//! Equipment status snapshot — the flattened read model stored in the
//! status cache.
//!
//! Snapshots are immutable: every update goes through a `with_*` method
//! returning a new value, and the cache replaces entries wholesale.

use serde::{Deserialize, Serialize};

use fabgate_domain::connection::{ConnectionQuality, ConnectionState};
use fabgate_domain::equipment::Equipment;
use fabgate_domain::health::HealthStatus;
use fabgate_domain::id::EquipmentId;
use fabgate_domain::state::EquipmentState;
use fabgate_domain::time::{now, Timestamp};

/// Flattened view of one equipment for downstream readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentStatusSnapshot {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub state: EquipmentState,
    pub health: HealthStatus,
    pub is_connected: bool,
    pub quality: ConnectionQuality,
    pub last_heartbeat_at: Option<Timestamp>,
    pub active_alarm_count: usize,
    pub updated_at: Timestamp,
}

impl EquipmentStatusSnapshot {
    /// A default snapshot for an equipment the cache has never seen.
    ///
    /// Used by the propagation pipeline so a cold cache never fails the
    /// pipeline.
    #[must_use]
    pub fn default_for(equipment_id: EquipmentId) -> Self {
        Self {
            name: equipment_id.to_string(),
            equipment_id,
            state: EquipmentState::Offline,
            health: HealthStatus::Unknown,
            is_connected: false,
            quality: ConnectionQuality::Unknown,
            last_heartbeat_at: None,
            active_alarm_count: 0,
            updated_at: now(),
        }
    }

    /// Snapshot of a live aggregate.
    #[must_use]
    pub fn of(equipment: &Equipment) -> Self {
        Self {
            equipment_id: equipment.id.clone(),
            name: equipment.name.clone(),
            state: equipment.state,
            health: equipment.health,
            is_connected: equipment.connection.is_connected,
            quality: equipment.connection.quality,
            last_heartbeat_at: equipment.connection.last_heartbeat_at,
            active_alarm_count: equipment.active_alarms.len(),
            updated_at: equipment.updated_at,
        }
    }

    /// Copy with a new operational state.
    #[must_use]
    pub fn with_state(self, state: EquipmentState) -> Self {
        Self {
            state,
            updated_at: now(),
            ..self
        }
    }

    /// Copy with a new health status.
    #[must_use]
    pub fn with_health(self, health: HealthStatus) -> Self {
        Self {
            health,
            updated_at: now(),
            ..self
        }
    }

    /// Copy with the connection fields taken from `connection`.
    #[must_use]
    pub fn with_connection(self, connection: &ConnectionState) -> Self {
        Self {
            is_connected: connection.is_connected,
            quality: connection.quality,
            last_heartbeat_at: connection.last_heartbeat_at,
            updated_at: now(),
            ..self
        }
    }

    /// Copy with a new display name.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updated_at: now(),
            ..self
        }
    }
}
