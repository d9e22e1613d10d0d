//! Domain events — immutable, self-contained records of aggregate changes.
//!
//! Each event carries everything downstream consumers need (previous/new
//! values, reason, actor, timing) so the cache and broker can be updated
//! without consulting the aggregate again.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::health::HealthStatus;
use crate::id::{EquipmentId, EventId, SessionId};
use crate::state::EquipmentState;
use crate::time::Timestamp;

/// Schema version stamped on every event.
pub const EVENT_VERSION: u16 = 1;

/// An immutable record of something that happened to one equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentEvent {
    pub event_id: EventId,
    pub equipment_id: EquipmentId,
    pub occurred_at: Timestamp,
    pub version: u16,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// What actually changed, one variant per event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    Connected {
        session_id: SessionId,
        connected_at: Timestamp,
    },
    Disconnected {
        reason: Option<String>,
        disconnected_at: Timestamp,
    },
    StateChanged {
        previous: EquipmentState,
        current: EquipmentState,
        reason: String,
        changed_by: Option<String>,
        /// How long the equipment spent in `previous`, in milliseconds.
        previous_state_duration_ms: i64,
        is_critical: bool,
    },
    HealthChanged {
        previous: HealthStatus,
        current: HealthStatus,
    },
    RequiresAttention {
        state: EquipmentState,
        reason: String,
    },
    ConfigurationChanged {
        description: String,
        changed_by: Option<String>,
    },
    BasicInfoUpdated {
        name: String,
        updated_by: Option<String>,
    },
}

impl EquipmentEvent {
    /// Wrap a payload in a fresh envelope for `equipment_id`.
    #[must_use]
    pub fn new(equipment_id: EquipmentId, payload: EventPayload) -> Self {
        Self {
            event_id: EventId::new(),
            equipment_id,
            occurred_at: crate::time::now(),
            version: EVENT_VERSION,
            payload,
        }
    }

    /// Stable discriminator string for routing and logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            EventPayload::Connected { .. } => "connected",
            EventPayload::Disconnected { .. } => "disconnected",
            EventPayload::StateChanged { .. } => "state_changed",
            EventPayload::HealthChanged { .. } => "health_changed",
            EventPayload::RequiresAttention { .. } => "requires_attention",
            EventPayload::ConfigurationChanged { .. } => "configuration_changed",
            EventPayload::BasicInfoUpdated { .. } => "basic_info_updated",
        }
    }

    /// Whether downstream systems should treat this event as critical.
    ///
    /// Drives broker topic selection: critical events go to a distinct
    /// topic so operators can subscribe to just those.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        match &self.payload {
            EventPayload::StateChanged { is_critical, .. } => *is_critical,
            EventPayload::RequiresAttention { .. } => true,
            EventPayload::HealthChanged { current, .. } => *current == HealthStatus::Unhealthy,
            EventPayload::Disconnected { .. } => true,
            _ => false,
        }
    }

    /// The connection snapshot carried by connection events, if any.
    ///
    /// Used by the propagation pipeline to patch cached snapshots without
    /// re-reading the aggregate.
    #[must_use]
    pub fn connection_delta(&self) -> Option<ConnectionDelta> {
        match &self.payload {
            EventPayload::Connected {
                session_id,
                connected_at,
            } => Some(ConnectionDelta::Connected {
                session_id: *session_id,
                at: *connected_at,
            }),
            EventPayload::Disconnected {
                reason,
                disconnected_at,
            } => Some(ConnectionDelta::Disconnected {
                reason: reason.clone(),
                at: *disconnected_at,
            }),
            _ => None,
        }
    }
}

/// Connection change described by a [`Connected`](EventPayload::Connected)
/// or [`Disconnected`](EventPayload::Disconnected) event.
#[derive(Debug, Clone)]
pub enum ConnectionDelta {
    Connected {
        session_id: SessionId,
        at: Timestamp,
    },
    Disconnected {
        reason: Option<String>,
        at: Timestamp,
    },
}

impl ConnectionDelta {
    /// Apply this delta to a connection snapshot, returning the new one.
    #[must_use]
    pub fn apply(&self, connection: &ConnectionState) -> ConnectionState {
        match self {
            Self::Connected { session_id, at } => connection.connected(*session_id, *at),
            Self::Disconnected { reason, at } => connection.disconnected(reason.as_deref(), *at),
        }
    }
}
