//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`GatewayError`]
//! via `#[from]`. Expected failure paths (validation, unreachable devices,
//! state rejections) are values, never panics.

use crate::state::EquipmentState;

/// Top-level error type crossing port boundaries.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A domain invariant was violated before any IO happened.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The referenced aggregate or record does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// An operation was attempted in a state that disallows it.
    #[error("invalid operation for current state")]
    State(#[from] StateError),

    /// A network session operation failed.
    #[error("connection error")]
    Connection(#[from] ConnectionError),

    /// The persistence layer failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A cache or broker sink failed during event propagation.
    #[error("propagation error: {0}")]
    Propagation(String),
}

/// Pre-IO validation failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("equipment id {id:?} is invalid: {reason}")]
    InvalidEquipmentId { id: String, reason: &'static str },

    #[error("port must be in range 1..=65535")]
    PortOutOfRange,

    #[error("timeout must be in range {min}..={max} seconds, got {value}")]
    TimeoutOutOfRange { value: u64, min: u64, max: u64 },

    #[error("host {host:?} is not a valid hostname or IP address")]
    InvalidHost { host: String },
}

/// The referenced entity does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} with id {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// An operation was rejected by the equipment state machine.
#[derive(Debug, thiserror::Error)]
#[error("operation {operation:?} is not allowed while equipment is {state}")]
pub struct StateError {
    pub operation: String,
    pub state: EquipmentState,
}

/// Network session failures, all expected and recoverable.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection attempt timed out after {0} seconds")]
    Timeout(u64),

    #[error("connection refused by {host}:{port}")]
    Refused { host: String, port: u16 },

    #[error("session handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("equipment {0} is not registered")]
    NotRegistered(String),

    #[error("gave up after {attempts} reconnection attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("equipment identified itself as {actual}, expected {expected}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("equipment {0} is already registered")]
    AlreadyRegistered(String),
}
