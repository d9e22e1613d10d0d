//! # fabgate-adapter-session-virtual
//!
//! Virtual equipment adapter — simulated device sessions for testing and
//! demonstration. No real network IO; latency, refusals, command failures,
//! and heartbeat stalls are all injectable at runtime through
//! [`VirtualControls`].
//!
//! ## Provided behaviour
//!
//! | Control | Effect |
//! |---------|--------|
//! | `refuse_connections` | `connect` fails with `ConnectionError::Refused` |
//! | `pause_heartbeats` | `last_heartbeat_at` freezes at the pause instant |
//! | `fail_commands` | every command returns an unsuccessful outcome |
//!
//! ## Dependency rule
//!
//! Depends on `fabgate-app` (port traits) and `fabgate-domain` only.

mod controls;

use std::collections::HashMap;
use std::time::Duration;

use fabgate_app::config::EndpointConfig;
use fabgate_app::ports::{CommandOutcome, DeviceSession, SessionFactory, SessionMetadata};
use fabgate_domain::error::ConnectionError;
use fabgate_domain::id::{EquipmentId, SessionId};
use fabgate_domain::time::{now, Timestamp};

pub use controls::{ControlsHandle, VirtualControls};

/// Static description of one simulated equipment, keyed by host.
#[derive(Debug, Clone)]
pub struct VirtualEquipment {
    /// The id the equipment identifies itself with during the handshake.
    pub equipment_id: String,
    pub model: String,
    pub firmware: Option<String>,
    /// Simulated handshake latency.
    pub connect_latency: Duration,
    /// Simulated reply latency for commands.
    pub command_latency: Duration,
}

impl VirtualEquipment {
    /// A simulated equipment answering as `equipment_id` with near-zero
    /// latency.
    #[must_use]
    pub fn answering(equipment_id: impl Into<String>) -> Self {
        let equipment_id = equipment_id.into();
        Self {
            model: format!("VTool-{equipment_id}"),
            equipment_id,
            firmware: Some("1.0.0".to_string()),
            connect_latency: Duration::from_millis(1),
            command_latency: Duration::from_millis(1),
        }
    }

    /// Same equipment with the given handshake latency.
    #[must_use]
    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }
}

/// Factory for virtual sessions — the simulated fab floor.
///
/// Hosts not described in the fleet refuse connections, like an empty
/// bay on the real floor.
#[derive(Default)]
pub struct VirtualFleet {
    equipment: HashMap<String, VirtualEquipment>,
    controls: HashMap<String, ControlsHandle>,
}

impl VirtualFleet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a simulated equipment at `host`.
    #[must_use]
    pub fn with_equipment(mut self, host: impl Into<String>, equipment: VirtualEquipment) -> Self {
        let host = host.into();
        self.controls.insert(host.clone(), ControlsHandle::default());
        self.equipment.insert(host, equipment);
        self
    }

    /// Runtime fault-injection handle for the equipment at `host`.
    #[must_use]
    pub fn controls(&self, host: &str) -> Option<ControlsHandle> {
        self.controls.get(host).cloned()
    }
}

impl SessionFactory for VirtualFleet {
    type Session = VirtualSession;

    fn create(&self, config: &EndpointConfig) -> Result<Self::Session, ConnectionError> {
        let equipment = self
            .equipment
            .get(&config.host)
            .cloned()
            .ok_or_else(|| ConnectionError::Refused {
                host: config.host.clone(),
                port: config.port,
            })?;
        let controls = self
            .controls
            .get(&config.host)
            .cloned()
            .unwrap_or_default();

        Ok(VirtualSession {
            equipment,
            controls,
            host: config.host.clone(),
            port: config.port,
            online: false,
            frozen_heartbeat: None,
        })
    }
}

/// One simulated session. State lives entirely in memory.
pub struct VirtualSession {
    equipment: VirtualEquipment,
    controls: ControlsHandle,
    host: String,
    port: u16,
    online: bool,
    /// Heartbeat timestamp captured when heartbeats were paused.
    frozen_heartbeat: Option<Timestamp>,
}

impl DeviceSession for VirtualSession {
    async fn connect(&mut self, _timeout: Duration) -> Result<SessionMetadata, ConnectionError> {
        tokio::time::sleep(self.equipment.connect_latency).await;

        if self.controls.refuses_connections() {
            return Err(ConnectionError::Refused {
                host: self.host.clone(),
                port: self.port,
            });
        }

        self.online = true;
        self.frozen_heartbeat = None;
        Ok(SessionMetadata {
            equipment_id: EquipmentId::new(self.equipment.equipment_id.as_str()).map_err(|_| {
                ConnectionError::HandshakeFailed(format!(
                    "equipment reported invalid id {:?}",
                    self.equipment.equipment_id
                ))
            })?,
            model: self.equipment.model.clone(),
            firmware: self.equipment.firmware.clone(),
            session_id: SessionId::new(),
        })
    }

    async fn disconnect(&mut self, _reason: Option<&str>) -> Result<(), ConnectionError> {
        self.online = false;
        Ok(())
    }

    async fn send_command(
        &mut self,
        name: &str,
        _parameters: &HashMap<String, serde_json::Value>,
        _requested_by: &str,
    ) -> Result<CommandOutcome, ConnectionError> {
        if !self.online {
            return Err(ConnectionError::NotRegistered(
                self.equipment.equipment_id.clone(),
            ));
        }
        tokio::time::sleep(self.equipment.command_latency).await;

        if self.controls.fails_commands() {
            return Ok(CommandOutcome {
                is_successful: false,
                result_message: None,
                error_message: Some(format!("equipment rejected {name}")),
            });
        }
        Ok(CommandOutcome {
            is_successful: true,
            result_message: Some(format!("ack {name}")),
            error_message: None,
        })
    }

    fn is_online(&self) -> bool {
        self.online
    }

    fn last_heartbeat_at(&self) -> Option<Timestamp> {
        if !self.online {
            return None;
        }
        if self.controls.heartbeats_paused() {
            return self.frozen_heartbeat;
        }
        // A healthy virtual equipment heartbeats continuously.
        Some(now())
    }

    async fn probe(&mut self) -> bool {
        if self.controls.heartbeats_paused() && self.frozen_heartbeat.is_none() {
            self.frozen_heartbeat = Some(now());
        }
        self.online && !self.controls.refuses_connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            port: 5000,
            expected_id: None,
            timeout_seconds: 5,
        }
    }

    fn fleet() -> VirtualFleet {
        VirtualFleet::new().with_equipment("10.0.0.5", VirtualEquipment::answering("ETCH-01"))
    }

    #[tokio::test]
    async fn should_answer_handshake_with_configured_identity() {
        let fleet = fleet();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();

        let metadata = session.connect(Duration::from_secs(5)).await.unwrap();
        assert_eq!(metadata.equipment_id.as_str(), "ETCH-01");
        assert_eq!(metadata.model, "VTool-ETCH-01");
        assert!(session.is_online());
    }

    #[test]
    fn should_refuse_unknown_host() {
        let result = fleet().create(&endpoint("10.0.0.99"));
        assert!(matches!(result, Err(ConnectionError::Refused { .. })));
    }

    #[tokio::test]
    async fn should_refuse_connection_when_controls_say_so() {
        let fleet = fleet();
        let controls = fleet.controls("10.0.0.5").unwrap();
        controls.refuse_connections(true);

        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();
        let result = session.connect(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ConnectionError::Refused { .. })));
        assert!(!session.is_online());
    }

    #[tokio::test]
    async fn should_recover_once_refusal_is_lifted() {
        let fleet = fleet();
        let controls = fleet.controls("10.0.0.5").unwrap();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();

        controls.refuse_connections(true);
        assert!(session.connect(Duration::from_secs(5)).await.is_err());

        controls.refuse_connections(false);
        assert!(session.connect(Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn should_heartbeat_while_online() {
        let fleet = fleet();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();
        assert!(session.last_heartbeat_at().is_none());

        session.connect(Duration::from_secs(5)).await.unwrap();
        assert!(session.last_heartbeat_at().is_some());
        assert!(session.probe().await);
    }

    #[tokio::test]
    async fn should_freeze_heartbeat_when_paused() {
        let fleet = fleet();
        let controls = fleet.controls("10.0.0.5").unwrap();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();
        session.connect(Duration::from_secs(5)).await.unwrap();

        controls.pause_heartbeats(true);
        session.probe().await;
        let first = session.last_heartbeat_at();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = session.last_heartbeat_at();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn should_fail_commands_when_injected() {
        let fleet = fleet();
        let controls = fleet.controls("10.0.0.5").unwrap();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();
        session.connect(Duration::from_secs(5)).await.unwrap();

        controls.fail_commands(true);
        let outcome = session
            .send_command("start", &HashMap::new(), "operator")
            .await
            .unwrap();
        assert!(!outcome.is_successful);
        assert!(outcome.error_message.is_some());
    }

    #[tokio::test]
    async fn should_ack_commands_when_healthy() {
        let fleet = fleet();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();
        session.connect(Duration::from_secs(5)).await.unwrap();

        let outcome = session
            .send_command("start", &HashMap::new(), "operator")
            .await
            .unwrap();
        assert!(outcome.is_successful);
        assert_eq!(outcome.result_message.as_deref(), Some("ack start"));
    }

    #[tokio::test]
    async fn should_reject_commands_while_offline() {
        let fleet = fleet();
        let mut session = fleet.create(&endpoint("10.0.0.5")).unwrap();

        let result = session.send_command("start", &HashMap::new(), "op").await;
        assert!(result.is_err());
    }
}
