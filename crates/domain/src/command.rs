//! Remote commands — requests sent to equipment, tracked through their
//! lifecycle on the aggregate's bounded history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::CommandId;
use crate::time::Timestamp;

/// Lifecycle status of a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Requested,
    Sent,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl CommandStatus {
    /// Whether the command has reached a final status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// A command requested against a piece of equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub id: CommandId,
    pub name: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub requested_by: String,
    pub requested_at: Timestamp,
    pub timeout_seconds: u64,
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl RemoteCommand {
    /// Create a freshly requested command.
    #[must_use]
    pub fn requested(
        name: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        requested_by: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            id: CommandId::new(),
            name: name.into(),
            parameters,
            requested_by: requested_by.into(),
            requested_at: crate::time::now(),
            timeout_seconds,
            status: CommandStatus::Requested,
            message: None,
        }
    }
}
