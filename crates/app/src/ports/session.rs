//! Session port — one live protocol session per connected equipment.
//!
//! The wire-level encoding of the underlying industrial protocol is the
//! adapter's business; the core depends only on this contract.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use fabgate_domain::error::ConnectionError;
use fabgate_domain::id::{EquipmentId, SessionId};
use fabgate_domain::time::Timestamp;

/// What the equipment reported about itself during the session handshake.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    /// The id the equipment identifies itself with.
    pub equipment_id: EquipmentId,
    pub model: String,
    pub firmware: Option<String>,
    pub session_id: SessionId,
}

/// Result of sending one command over the session.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub is_successful: bool,
    pub result_message: Option<String>,
    pub error_message: Option<String>,
}

/// A live network session to one piece of equipment.
///
/// The connection manager owns exactly one session per registered
/// equipment and serializes all calls through it, so implementations
/// never see concurrent `connect`/`disconnect` on the same session.
pub trait DeviceSession: Send + 'static {
    /// Establish the session, returning the equipment's self-reported
    /// metadata.
    fn connect(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<SessionMetadata, ConnectionError>> + Send;

    /// Tear the session down. Safe to call when already disconnected.
    fn disconnect(
        &mut self,
        reason: Option<&str>,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Send a command and wait for the equipment's reply.
    fn send_command(
        &mut self,
        name: &str,
        parameters: &HashMap<String, serde_json::Value>,
        requested_by: &str,
    ) -> impl Future<Output = Result<CommandOutcome, ConnectionError>> + Send;

    /// Whether the session currently considers itself connected.
    fn is_online(&self) -> bool;

    /// When the equipment last sent a heartbeat over this session.
    fn last_heartbeat_at(&self) -> Option<Timestamp>;

    /// Best-effort connectivity check; `false` on any doubt.
    fn probe(&mut self) -> impl Future<Output = bool> + Send;
}

/// Creates sessions for endpoints. Implemented by protocol adapters.
pub trait SessionFactory: Send + Sync {
    type Session: DeviceSession;

    /// Build an unconnected session for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the endpoint cannot even be
    /// prepared (e.g. unresolvable host).
    fn create(&self, config: &crate::config::EndpointConfig)
        -> Result<Self::Session, ConnectionError>;
}
