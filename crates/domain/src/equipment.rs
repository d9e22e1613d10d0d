//! Equipment — the aggregate root for one manufacturing tool.
//!
//! All state and connection mutations go through aggregate methods. Each
//! mutation appends an immutable [`EquipmentEvent`] to a private buffer and
//! bumps `updated_at` monotonically; a coordinating layer drains the buffer
//! with [`take_events`](Equipment::take_events) after the mutation has been
//! applied and dispatches the events exactly once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, AlarmSeverity};
use crate::command::{CommandStatus, RemoteCommand};
use crate::connection::ConnectionState;
use crate::error::{NotFoundError, StateError, ValidationError};
use crate::event::{EquipmentEvent, EventPayload};
use crate::health::HealthStatus;
use crate::id::{CommandId, EquipmentId, SessionId};
use crate::metrics::EquipmentMetrics;
use crate::state::EquipmentState;
use crate::time::{now, Timestamp};

/// Maximum number of remote commands kept on the aggregate; the oldest is
/// evicted when the limit is reached.
pub const COMMAND_HISTORY_LIMIT: usize = 100;

/// Aggregate root tracking one equipment's operational state, connection,
/// alarms, command history, and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub state: EquipmentState,
    pub sub_state: Option<String>,
    pub connection: ConnectionState,
    pub health: HealthStatus,
    pub metrics: EquipmentMetrics,
    pub active_alarms: Vec<Alarm>,
    pub command_history: Vec<RemoteCommand>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    /// When the current operational state was entered, for event timing.
    pub state_entered_at: Timestamp,
    #[serde(skip)]
    pending_events: Vec<EquipmentEvent>,
}

impl Equipment {
    /// Create a builder for constructing an [`Equipment`].
    #[must_use]
    pub fn builder() -> EquipmentBuilder {
        EquipmentBuilder::default()
    }

    /// Events accumulated since the last drain, in emission order.
    ///
    /// Draining clears the buffer; each event is therefore returned exactly
    /// once.
    pub fn take_events(&mut self) -> Vec<EquipmentEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Number of events waiting to be drained.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Transition the operational state machine.
    ///
    /// A transition to the current state is a no-op: no event, no timestamp
    /// bump. Otherwise emits `StateChanged` (with previous/new state,
    /// reason, actor, time spent in the previous state, and a critical flag
    /// set when leaving an available state for an unavailable one), then
    /// re-derives health and emits `HealthChanged` / `RequiresAttention`
    /// as applicable.
    pub fn update_state(
        &mut self,
        new_state: EquipmentState,
        reason: impl Into<String>,
        changed_by: Option<&str>,
        is_automatic: bool,
    ) {
        if new_state == self.state {
            return;
        }

        let reason = reason.into();
        let at = now();
        let previous = self.state;
        let previous_duration = at - self.state_entered_at;
        let is_critical = previous.is_available() && !new_state.is_available();
        let actor = changed_by
            .map(str::to_string)
            .or_else(|| is_automatic.then(|| "system".to_string()));

        self.state = new_state;
        self.state_entered_at = at;
        self.updated_by.clone_from(&actor);
        self.touch(at);

        self.emit(EventPayload::StateChanged {
            previous,
            current: new_state,
            reason: reason.clone(),
            changed_by: actor,
            previous_state_duration_ms: previous_duration.num_milliseconds(),
            is_critical,
        });

        self.refresh_health();

        if new_state.requires_attention() {
            self.emit(EventPayload::RequiresAttention {
                state: new_state,
                reason,
            });
        }
    }

    /// Record a successful connection, emitting `Connected`.
    pub fn mark_connected(&mut self, session_id: SessionId, at: Timestamp) {
        self.connection = self.connection.connected(session_id, at);
        self.touch(at);
        self.emit(EventPayload::Connected {
            session_id,
            connected_at: at,
        });
    }

    /// Record a disconnect, emitting `Disconnected`.
    ///
    /// An equipment that was in an available state is forced to `Offline`
    /// (with its own `StateChanged`) since we can no longer observe it.
    pub fn mark_disconnected(&mut self, reason: Option<&str>, at: Timestamp) {
        self.connection = self.connection.disconnected(reason, at);
        self.touch(at);
        self.emit(EventPayload::Disconnected {
            reason: reason.map(str::to_string),
            disconnected_at: at,
        });

        if self.state.is_available() {
            self.update_state(
                EquipmentState::Offline,
                "connection lost",
                None,
                true,
            );
        }
    }

    /// Record a heartbeat. Telemetry only — no domain event.
    pub fn record_heartbeat(&mut self, at: Timestamp) {
        self.connection = self.connection.heartbeat(at);
        self.touch(at);
    }

    /// Record a failed reconnection attempt on the connection snapshot.
    pub fn record_retry_attempt(&mut self) {
        self.connection = self.connection.retry_attempted();
        self.touch(now());
    }

    /// Whether `command` may be executed in the current state.
    ///
    /// Commands require a live connection. While `Down` nothing is allowed;
    /// while `Fault` only recovery commands (`reset`, `abort`) pass.
    #[must_use]
    pub fn can_execute_command(&self, command: &str) -> bool {
        if !self.connection.is_connected {
            return false;
        }
        match self.state {
            EquipmentState::Down => false,
            EquipmentState::Fault => matches!(command, "reset" | "abort"),
            _ => true,
        }
    }

    /// Append a `Requested` remote command to the bounded history and
    /// return its id. Does not itself contact the device.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when [`can_execute_command`](Self::can_execute_command)
    /// is false; the aggregate is left untouched.
    pub fn execute_remote_command(
        &mut self,
        name: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        requested_by: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<CommandId, StateError> {
        let name = name.into();
        if !self.can_execute_command(&name) {
            return Err(StateError {
                operation: name,
                state: self.state,
            });
        }

        let command = RemoteCommand::requested(name, parameters, requested_by, timeout_seconds);
        let id = command.id;

        if self.command_history.len() >= COMMAND_HISTORY_LIMIT {
            self.command_history.remove(0);
        }
        self.command_history.push(command);
        self.touch(now());

        Ok(id)
    }

    /// Transition a command in the history to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when no command with `command_id` exists.
    pub fn update_command_status(
        &mut self,
        command_id: CommandId,
        status: CommandStatus,
        message: Option<&str>,
    ) -> Result<(), NotFoundError> {
        let command = self
            .command_history
            .iter_mut()
            .find(|c| c.id == command_id)
            .ok_or_else(|| NotFoundError {
                entity: "RemoteCommand",
                id: command_id.to_string(),
            })?;

        command.status = status;
        command.message = message.map(str::to_string);
        self.touch(now());
        Ok(())
    }

    /// Raise an alarm, idempotent by alarm code.
    ///
    /// Critical alarms additionally emit `RequiresAttention`.
    pub fn raise_alarm(&mut self, alarm: Alarm) {
        if self.active_alarms.iter().any(|a| a.code == alarm.code) {
            return;
        }
        let is_critical = alarm.severity == AlarmSeverity::Critical;
        let reason = format!("alarm {}: {}", alarm.code, alarm.text);
        self.active_alarms.push(alarm);
        self.touch(now());
        self.refresh_health();
        if is_critical {
            self.emit(EventPayload::RequiresAttention {
                state: self.state,
                reason,
            });
        }
    }

    /// Clear the active alarm with `code`, if present.
    pub fn clear_alarm(&mut self, code: &str) {
        let before = self.active_alarms.len();
        self.active_alarms.retain(|a| a.code != code);
        if self.active_alarms.len() != before {
            self.touch(now());
            self.refresh_health();
        }
    }

    /// Rename the equipment, emitting `BasicInfoUpdated`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when `name` is empty; the
    /// aggregate is left untouched.
    pub fn update_basic_info(
        &mut self,
        name: impl Into<String>,
        updated_by: Option<&str>,
    ) -> Result<(), ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        self.name.clone_from(&name);
        self.updated_by = updated_by.map(str::to_string);
        self.touch(now());
        self.emit(EventPayload::BasicInfoUpdated {
            name,
            updated_by: updated_by.map(str::to_string),
        });
        Ok(())
    }

    /// Record a configuration change on the tool, emitting
    /// `ConfigurationChanged` for the audit trail. The configuration itself
    /// lives on the equipment; only the fact of the change is tracked here.
    pub fn record_configuration_change(
        &mut self,
        description: impl Into<String>,
        changed_by: Option<&str>,
    ) {
        self.updated_by = changed_by.map(str::to_string);
        self.touch(now());
        self.emit(EventPayload::ConfigurationChanged {
            description: description.into(),
            changed_by: changed_by.map(str::to_string),
        });
    }

    /// Fold one processing result into the metrics. No event.
    pub fn record_processing_result(&mut self, success: bool, duration_ms: f64) {
        self.metrics.record(success, duration_ms);
        self.touch(now());
    }

    fn refresh_health(&mut self) {
        let derived = HealthStatus::derive(self.state, self.active_alarms.len());
        if derived != self.health {
            let previous = self.health;
            self.health = derived;
            self.emit(EventPayload::HealthChanged {
                previous,
                current: derived,
            });
        }
    }

    fn emit(&mut self, payload: EventPayload) {
        self.pending_events
            .push(EquipmentEvent::new(self.id.clone(), payload));
    }

    // updated_at never moves backwards, even with a skewed clock.
    fn touch(&mut self, at: Timestamp) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Step-by-step builder for [`Equipment`].
#[derive(Debug, Default)]
pub struct EquipmentBuilder {
    id: Option<EquipmentId>,
    name: Option<String>,
    created_by: Option<String>,
    max_retries: Option<u32>,
    heartbeat_interval_secs: Option<u64>,
}

impl EquipmentBuilder {
    #[must_use]
    pub fn id(mut self, id: EquipmentId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn heartbeat_interval_secs(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = Some(secs);
        self
    }

    /// Consume the builder, validate, and return an [`Equipment`].
    ///
    /// The equipment starts `Offline`, disconnected, with empty alarms and
    /// history.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when no name was provided, or
    /// [`ValidationError::InvalidEquipmentId`] when no id was provided.
    pub fn build(self) -> Result<Equipment, ValidationError> {
        let id = self.id.ok_or(ValidationError::InvalidEquipmentId {
            id: String::new(),
            reason: "must not be empty",
        })?;
        let name = self.name.filter(|n| !n.is_empty());
        let Some(name) = name else {
            return Err(ValidationError::EmptyName);
        };

        let at = now();
        let connection = ConnectionState::new(
            self.max_retries
                .unwrap_or(crate::connection::DEFAULT_MAX_RETRIES),
            self.heartbeat_interval_secs
                .unwrap_or(crate::connection::DEFAULT_HEARTBEAT_INTERVAL_SECS),
        );

        Ok(Equipment {
            id,
            name,
            state: EquipmentState::Offline,
            sub_state: None,
            connection,
            health: HealthStatus::Unknown,
            metrics: EquipmentMetrics::default(),
            active_alarms: Vec::new(),
            command_history: Vec::new(),
            created_at: at,
            updated_at: at,
            created_by: self.created_by.clone(),
            updated_by: self.created_by,
            state_entered_at: at,
            pending_events: Vec::new(),
        })
    }
}
