//! Equipment state — the operational state machine of one tool.

use serde::{Deserialize, Serialize};

/// Discrete operational state of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentState {
    Idle,
    Setup,
    Executing,
    Pause,
    Fault,
    Alarm,
    Maintenance,
    Down,
    #[default]
    Offline,
}

impl EquipmentState {
    /// Whether the equipment can accept work (Idle, Setup, Executing, Pause).
    #[must_use]
    pub fn is_available(self) -> bool {
        matches!(self, Self::Idle | Self::Setup | Self::Executing | Self::Pause)
    }

    /// Whether an operator needs to look at this tool (Fault, Alarm, Down).
    #[must_use]
    pub fn requires_attention(self) -> bool {
        matches!(self, Self::Fault | Self::Alarm | Self::Down)
    }

    /// Ordinal severity ranking, lowest for normal operation.
    #[must_use]
    pub fn severity_level(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Executing => 1,
            Self::Setup => 2,
            Self::Pause => 3,
            Self::Maintenance => 4,
            Self::Offline => 5,
            Self::Alarm => 6,
            Self::Fault => 7,
            Self::Down => 8,
        }
    }
}

impl std::fmt::Display for EquipmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Setup => f.write_str("setup"),
            Self::Executing => f.write_str("executing"),
            Self::Pause => f.write_str("pause"),
            Self::Fault => f.write_str("fault"),
            Self::Alarm => f.write_str("alarm"),
            Self::Maintenance => f.write_str("maintenance"),
            Self::Down => f.write_str("down"),
            Self::Offline => f.write_str("offline"),
        }
    }
}
