//! Health status — derived from operational state and active alarms,
//! never set directly.

use serde::{Deserialize, Serialize};

use crate::state::EquipmentState;

/// Overall health of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Derive health from the operational state and the active-alarm count.
    #[must_use]
    pub fn derive(state: EquipmentState, active_alarms: usize) -> Self {
        match state {
            EquipmentState::Fault | EquipmentState::Down => Self::Unhealthy,
            EquipmentState::Alarm if active_alarms > 0 => Self::Degraded,
            EquipmentState::Maintenance => Self::Degraded,
            EquipmentState::Idle
            | EquipmentState::Setup
            | EquipmentState::Executing
            | EquipmentState::Pause => Self::Healthy,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}
