//! Multi-device connection manager.
//!
//! Owns the registry of live sessions keyed by equipment id. Callers only
//! ever receive ids and cloned snapshots; the sessions themselves stay
//! behind the manager, and all operations on one equipment are serialized
//! through that equipment's entry lock so a `connect` can never race a
//! `disconnect` on the same device. Operations on different equipment run
//! concurrently and are isolated from each other's failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use fabgate_domain::command::CommandStatus;
use fabgate_domain::equipment::Equipment;
use fabgate_domain::error::{ConnectionError, GatewayError, NotFoundError};
use fabgate_domain::event::EquipmentEvent;
use fabgate_domain::id::EquipmentId;
use fabgate_domain::state::EquipmentState;
use fabgate_domain::time::now;

use crate::config::{EndpointConfig, GatewayConfig};
use crate::ports::{CommandOutcome, DeviceSession, EventPublisher, SessionFactory, SessionMetadata};
use crate::snapshot::EquipmentStatusSnapshot;

/// Successful outcome of [`ConnectionManager::add_and_connect`].
#[derive(Debug, Clone)]
pub struct ConnectResult {
    pub equipment_id: EquipmentId,
    pub metadata: SessionMetadata,
    pub elapsed: Duration,
}

/// One failed endpoint from a bulk connect.
#[derive(Debug)]
pub struct ConnectFailure {
    pub host: String,
    pub port: u16,
    pub error: GatewayError,
}

/// Aggregate outcome of [`ConnectionManager::connect_multiple`].
///
/// `results` surface in completion order; the counts are order-independent.
#[derive(Debug)]
pub struct MultiConnectReport {
    pub results: Vec<Result<ConnectResult, ConnectFailure>>,
    pub successful_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub total_duration: Duration,
}

/// Read model over the manager's counters and registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatistics {
    pub total_devices: usize,
    pub connected_devices: usize,
    pub online_devices: usize,
    pub total_connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
}

/// Health verdict for one device, produced by [`ConnectionManager::check_health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// The device went silent past the staleness threshold (or failed its
    /// probe) and has been marked disconnected; a reconnect should be
    /// scheduled.
    Stale,
    /// The device is already disconnected; nothing to check.
    NotConnected,
}

struct DeviceEntry<S> {
    session: S,
    endpoint: EndpointConfig,
    equipment: Equipment,
}

struct ManagedDevice<S> {
    entry: Mutex<DeviceEntry<S>>,
}

/// Registry of device sessions plus the connect/reconnect orchestration.
pub struct ConnectionManager<F: SessionFactory, P> {
    factory: F,
    publisher: P,
    config: GatewayConfig,
    shutdown: CancellationToken,
    registry: RwLock<HashMap<EquipmentId, Arc<ManagedDevice<F::Session>>>>,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl<F, P> ConnectionManager<F, P>
where
    F: SessionFactory,
    P: EventPublisher + Send + Sync,
{
    /// Create a manager with no registered devices.
    pub fn new(factory: F, publisher: P, config: GatewayConfig, shutdown: CancellationToken) -> Self {
        Self {
            factory,
            publisher,
            config,
            shutdown,
            registry: RwLock::new(HashMap::new()),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Validate an endpoint, attempt one connection, and register the
    /// device on success.
    ///
    /// Registration is atomic: on any failure (validation, timeout,
    /// identity mismatch, duplicate id) nothing is registered and the
    /// session is torn down best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] pre-IO, or
    /// [`GatewayError::Connection`] for the structured failure paths.
    #[tracing::instrument(skip(self, endpoint), fields(host = %endpoint.host, port = endpoint.port))]
    pub async fn add_and_connect(
        &self,
        endpoint: EndpointConfig,
    ) -> Result<ConnectResult, GatewayError> {
        endpoint.validate()?;

        let started = Instant::now();
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let mut session = self.factory.create(&endpoint)?;
        let timeout = endpoint.timeout();

        let metadata = match tokio::time::timeout(timeout, session.connect(timeout)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(err)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "connect failed");
                return Err(err.into());
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(timeout_secs = endpoint.timeout_seconds, "connect timed out");
                return Err(ConnectionError::Timeout(endpoint.timeout_seconds).into());
            }
        };

        if let Some(expected) = &endpoint.expected_id {
            if *expected != metadata.equipment_id {
                let _ = session.disconnect(Some("identity mismatch")).await;
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(ConnectionError::IdentityMismatch {
                    expected: expected.to_string(),
                    actual: metadata.equipment_id.to_string(),
                }
                .into());
            }
        }

        let id = metadata.equipment_id.clone();
        let mut equipment = Equipment::builder()
            .id(id.clone())
            .name(metadata.model.clone())
            .max_retries(self.config.backoff.max_retries)
            .heartbeat_interval_secs(self.config.heartbeat_interval_secs)
            .build()?;
        equipment.mark_connected(metadata.session_id, now());
        equipment.update_state(EquipmentState::Idle, "session established", None, true);
        let events = equipment.take_events();

        {
            let mut registry = self.registry.write().await;
            if registry.contains_key(&id) {
                drop(registry);
                let _ = session.disconnect(Some("duplicate registration")).await;
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(ConnectionError::AlreadyRegistered(id.to_string()).into());
            }
            // The entry is fully constructed before insertion so no reader
            // can observe a partially registered device.
            registry.insert(
                id.clone(),
                Arc::new(ManagedDevice {
                    entry: Mutex::new(DeviceEntry {
                        session,
                        endpoint,
                        equipment,
                    }),
                }),
            );
        }

        self.successes.fetch_add(1, Ordering::Relaxed);
        self.publish_events(events).await;

        tracing::info!(equipment_id = %id, elapsed_ms = started.elapsed().as_millis(), "equipment connected");
        Ok(ConnectResult {
            equipment_id: id,
            metadata,
            elapsed: started.elapsed(),
        })
    }

    /// Reconnect a registered device: best-effort disconnect, then bounded
    /// retries under the backoff policy.
    ///
    /// The entry lock is held only for the connect attempts themselves,
    /// never across a backoff sleep, so status reads and health sweeps of
    /// the rest of the fleet are not delayed by one device in reconnection.
    ///
    /// Returns `Ok(false)` — never an error — when the device is not
    /// registered (no side effects), when the shutdown token fires, or
    /// when the retry budget is exhausted. An exhausted device is marked
    /// `Down` and stays registered, visible through
    /// [`get_all_status`](Self::get_all_status), pending manual
    /// intervention.
    ///
    /// # Errors
    ///
    /// Only unexpected infrastructure failures; every expected outcome is
    /// `Ok(bool)`.
    #[tracing::instrument(skip(self))]
    pub async fn reconnect(&self, id: &EquipmentId) -> Result<bool, GatewayError> {
        let Some(device) = self.device(id).await else {
            return Ok(false);
        };

        let timeout = {
            let mut entry = device.entry.lock().await;
            let timeout = entry.endpoint.timeout();
            if entry.equipment.connection.is_connected {
                let _ = entry.session.disconnect(Some("reconnecting")).await;
                entry.equipment.mark_disconnected(Some("reconnecting"), now());
                let events = entry.equipment.take_events();
                drop(entry);
                self.publish_events(events).await;
            }
            timeout
        };

        let policy = self.config.backoff.clone();

        for attempt in 0..policy.max_retries {
            if self.shutdown.is_cancelled() {
                return Ok(false);
            }

            let delay = policy.delay_for(attempt);
            tokio::select! {
                () = self.shutdown.cancelled() => return Ok(false),
                () = tokio::time::sleep(delay) => {}
            }

            let mut entry = device.entry.lock().await;
            if entry.equipment.connection.is_connected {
                // Another task restored the session while we were backing
                // off.
                return Ok(true);
            }

            self.attempts.fetch_add(1, Ordering::Relaxed);
            match tokio::time::timeout(timeout, entry.session.connect(timeout)).await {
                Ok(Ok(metadata)) => {
                    self.successes.fetch_add(1, Ordering::Relaxed);
                    entry.equipment.mark_connected(metadata.session_id, now());
                    entry
                        .equipment
                        .update_state(EquipmentState::Idle, "reconnected", None, true);
                    let events = entry.equipment.take_events();
                    drop(entry);
                    self.publish_events(events).await;
                    tracing::info!(equipment_id = %id, attempt, "reconnected");
                    return Ok(true);
                }
                Ok(Err(err)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    entry.equipment.record_retry_attempt();
                    tracing::warn!(equipment_id = %id, attempt, error = %err, "reconnect attempt failed");
                }
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    entry.equipment.record_retry_attempt();
                    tracing::warn!(equipment_id = %id, attempt, "reconnect attempt timed out");
                }
            }
        }

        let mut entry = device.entry.lock().await;
        entry.equipment.update_state(
            EquipmentState::Down,
            "reconnection attempts exhausted",
            None,
            true,
        );
        let events = entry.equipment.take_events();
        drop(entry);
        self.publish_events(events).await;
        tracing::error!(equipment_id = %id, retries = policy.max_retries, "reconnect gave up");
        Ok(false)
    }

    /// Disconnect one device, keeping it registered.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] for an unregistered id.
    pub async fn disconnect(
        &self,
        id: &EquipmentId,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        let device = self.device(id).await.ok_or_else(|| NotFoundError {
            entity: "Equipment",
            id: id.to_string(),
        })?;
        let mut entry = device.entry.lock().await;

        if let Err(err) = entry.session.disconnect(reason).await {
            tracing::warn!(equipment_id = %id, error = %err, "session disconnect failed");
        }
        entry.equipment.mark_disconnected(reason, now());
        let events = entry.equipment.take_events();
        drop(entry);
        self.publish_events(events).await;
        Ok(())
    }

    /// Execute a remote command against a registered device.
    ///
    /// The aggregate gates the command against its state machine before any
    /// network traffic; the command's lifecycle is tracked in the history.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] for an unregistered id,
    /// [`GatewayError::State`] when the state machine rejects the command,
    /// [`GatewayError::Connection`] when the session send fails or the
    /// endpoint's command timeout expires (the command is marked
    /// [`CommandStatus::Timeout`]).
    #[tracing::instrument(skip(self, parameters))]
    pub async fn send_command(
        &self,
        id: &EquipmentId,
        name: &str,
        parameters: HashMap<String, serde_json::Value>,
        requested_by: &str,
    ) -> Result<CommandOutcome, GatewayError> {
        let device = self.device(id).await.ok_or_else(|| NotFoundError {
            entity: "Equipment",
            id: id.to_string(),
        })?;
        let mut entry = device.entry.lock().await;

        let timeout_seconds = entry.endpoint.timeout_seconds;
        let command_id =
            entry
                .equipment
                .execute_remote_command(name, parameters.clone(), requested_by, timeout_seconds)?;
        entry
            .equipment
            .update_command_status(command_id, CommandStatus::Sent, None)?;

        let started = Instant::now();
        let sent = tokio::time::timeout(
            Duration::from_secs(timeout_seconds),
            entry.session.send_command(name, &parameters, requested_by),
        )
        .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match sent {
            Ok(Ok(outcome)) => {
                let status = if outcome.is_successful {
                    CommandStatus::Completed
                } else {
                    CommandStatus::Failed
                };
                let message = outcome
                    .result_message
                    .as_deref()
                    .or(outcome.error_message.as_deref());
                entry
                    .equipment
                    .update_command_status(command_id, status, message)?;
                entry
                    .equipment
                    .record_processing_result(outcome.is_successful, elapsed_ms);
                let events = entry.equipment.take_events();
                drop(entry);
                self.publish_events(events).await;
                Ok(outcome)
            }
            Ok(Err(err)) => {
                entry.equipment.update_command_status(
                    command_id,
                    CommandStatus::Failed,
                    Some(&err.to_string()),
                )?;
                entry.equipment.record_processing_result(false, elapsed_ms);
                let events = entry.equipment.take_events();
                drop(entry);
                self.publish_events(events).await;
                Err(err.into())
            }
            Err(_) => {
                entry.equipment.update_command_status(
                    command_id,
                    CommandStatus::Timeout,
                    Some("no reply before the command timeout"),
                )?;
                entry.equipment.record_processing_result(false, elapsed_ms);
                let events = entry.equipment.take_events();
                drop(entry);
                self.publish_events(events).await;
                tracing::warn!(equipment_id = %id, command = name, timeout_seconds, "command timed out");
                Err(ConnectionError::Timeout(timeout_seconds).into())
            }
        }
    }

    /// Check one device's heartbeat freshness and connectivity.
    ///
    /// Pulls the session's latest heartbeat into the aggregate first, so
    /// staleness is judged on the freshest data available. A stale device
    /// is marked disconnected here; scheduling the reconnect is the
    /// caller's business.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] when the device was unregistered
    /// between listing and checking.
    pub async fn check_health(&self, id: &EquipmentId) -> Result<HealthVerdict, GatewayError> {
        let device = self.device(id).await.ok_or_else(|| NotFoundError {
            entity: "Equipment",
            id: id.to_string(),
        })?;
        let mut entry = device.entry.lock().await;

        if let Some(session_hb) = entry.session.last_heartbeat_at() {
            let fresher = entry
                .equipment
                .connection
                .last_heartbeat_at
                .map_or(true, |prev| session_hb > prev);
            if fresher {
                entry.equipment.record_heartbeat(session_hb);
            }
        }

        if !entry.equipment.connection.is_connected {
            return Ok(HealthVerdict::NotConnected);
        }

        let stale_heartbeat = entry
            .equipment
            .connection
            .heartbeat_age(now())
            .is_some_and(|age| {
                age.to_std()
                    .map(|age| age > self.config.staleness_threshold)
                    .unwrap_or(false)
            });
        let unreachable = !entry.session.probe().await;

        if stale_heartbeat || unreachable {
            let reason = if stale_heartbeat {
                "heartbeat stale"
            } else {
                "connectivity probe failed"
            };
            entry.equipment.mark_disconnected(Some(reason), now());
            let events = entry.equipment.take_events();
            drop(entry);
            self.publish_events(events).await;
            tracing::warn!(equipment_id = %id, reason, "device flagged unhealthy");
            return Ok(HealthVerdict::Stale);
        }

        Ok(HealthVerdict::Healthy)
    }

    /// Ids of all registered devices.
    pub async fn registered_ids(&self) -> Vec<EquipmentId> {
        self.registry.read().await.keys().cloned().collect()
    }

    /// Snapshot of every registered device. Pure read, no network IO.
    pub async fn get_all_status(&self) -> Vec<EquipmentStatusSnapshot> {
        let devices: Vec<_> = self.registry.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(devices.len());
        for device in devices {
            let entry = device.entry.lock().await;
            snapshots.push(EquipmentStatusSnapshot::of(&entry.equipment));
        }
        snapshots
    }

    /// Clone every registered aggregate, e.g. for persistence on shutdown.
    pub async fn export_equipment(&self) -> Vec<Equipment> {
        let devices: Vec<_> = self.registry.read().await.values().cloned().collect();
        let mut aggregates = Vec::with_capacity(devices.len());
        for device in devices {
            let entry = device.entry.lock().await;
            aggregates.push(entry.equipment.clone());
        }
        aggregates
    }

    /// Carry durable bookkeeping from a previously persisted aggregate
    /// into the freshly connected device with the same id.
    ///
    /// Live connection and operational state stay with the new session;
    /// the name, throughput metrics, command history, and creation audit
    /// fields survive the restart. Returns `false` when the id is not
    /// registered (e.g. the endpoint was removed from the configuration).
    pub async fn restore_persisted(&self, persisted: Equipment) -> bool {
        let Some(device) = self.device(&persisted.id).await else {
            return false;
        };
        let mut entry = device.entry.lock().await;
        entry.equipment.name = persisted.name;
        entry.equipment.metrics = persisted.metrics;
        entry.equipment.command_history = persisted.command_history;
        entry.equipment.created_at = persisted.created_at;
        entry.equipment.created_by = persisted.created_by;
        true
    }

    /// Counters and registry totals. Pure read, no network IO.
    pub async fn get_statistics(&self) -> ConnectionStatistics {
        let devices: Vec<_> = self.registry.read().await.values().cloned().collect();
        let total_devices = devices.len();
        let mut connected_devices = 0;
        let mut online_devices = 0;
        for device in devices {
            let entry = device.entry.lock().await;
            if entry.equipment.connection.is_connected {
                connected_devices += 1;
            }
            if entry.session.is_online() {
                online_devices += 1;
            }
        }

        ConnectionStatistics {
            total_devices,
            connected_devices,
            online_devices,
            total_connection_attempts: self.attempts.load(Ordering::Relaxed),
            successful_connections: self.successes.load(Ordering::Relaxed),
            failed_connections: self.failures.load(Ordering::Relaxed),
        }
    }

    async fn device(&self, id: &EquipmentId) -> Option<Arc<ManagedDevice<F::Session>>> {
        self.registry.read().await.get(id).cloned()
    }

    async fn publish_events(&self, events: Vec<EquipmentEvent>) {
        for event in events {
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(error = %err, "event publish failed");
            }
        }
    }
}

impl<F, P> ConnectionManager<F, P>
where
    F: SessionFactory + Send + Sync + 'static,
    F::Session: Send,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Connect many endpoints with bounded concurrency.
    ///
    /// Each attempt is independent: a failure or timeout on one endpoint
    /// never blocks or fails the others. In-flight attempts never exceed
    /// `max_concurrency` (the configured default when `None`).
    pub async fn connect_multiple(
        self: &Arc<Self>,
        endpoints: Vec<EndpointConfig>,
        max_concurrency: Option<usize>,
    ) -> MultiConnectReport {
        let limit = max_concurrency.unwrap_or(self.config.max_concurrency).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let manager = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore lives as long as every task; acquire can
                // only fail if it were closed, which never happens.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("connect semaphore closed");
                let host = endpoint.host.clone();
                let port = endpoint.port;
                manager
                    .add_and_connect(endpoint)
                    .await
                    .map_err(|error| ConnectFailure { host, port, error })
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => tracing::error!(error = %err, "connect task aborted"),
            }
        }

        let successful_count = results.iter().filter(|r| r.is_ok()).count();
        let failed_count = results.len() - successful_count;
        let success_rate = if results.is_empty() {
            0.0
        } else {
            successful_count as f64 / results.len() as f64
        };

        MultiConnectReport {
            results,
            successful_count,
            failed_count,
            success_rate,
            total_duration: started.elapsed(),
        }
    }

    /// Disconnect every registered device concurrently.
    ///
    /// Per-device failures are logged and never block disconnecting the
    /// rest; this always completes.
    pub async fn disconnect_all(self: &Arc<Self>) {
        let ids = self.registered_ids().await;
        let mut tasks = JoinSet::new();
        for id in ids {
            let manager = Arc::clone(self);
            tasks.spawn(async move {
                if let Err(err) = manager.disconnect(&id, Some("shutdown")).await {
                    tracing::warn!(equipment_id = %id, error = %err, "disconnect failed");
                }
            });
        }
        while tasks.join_next().await.is_some() {}
        tracing::info!("all devices disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use fabgate_domain::id::SessionId;
    use fabgate_domain::time::Timestamp;

    use crate::event_bus::InProcessEventBus;
    use crate::retry::BackoffPolicy;

    #[derive(Debug, Clone)]
    enum Behaviour {
        /// Answers the handshake after `delay`.
        Answer { id: &'static str, delay: Duration },
        /// Refuses immediately.
        Refuse,
        /// Never answers; the caller's timeout fires.
        Silent,
    }

    struct ScriptedSession {
        behaviour: Behaviour,
        host: String,
        port: u16,
        online: bool,
        heartbeat: Option<Timestamp>,
        probe_ok: bool,
        disconnect_fails: bool,
        counters: Arc<Counters>,
    }

    #[derive(Default)]
    struct Counters {
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl Counters {
        fn enter(&self) {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl DeviceSession for ScriptedSession {
        async fn connect(
            &mut self,
            _timeout: Duration,
        ) -> Result<SessionMetadata, ConnectionError> {
            self.counters.enter();
            let result = match self.behaviour.clone() {
                Behaviour::Answer { id, delay } => {
                    tokio::time::sleep(delay).await;
                    self.online = true;
                    self.heartbeat = Some(now());
                    Ok(SessionMetadata {
                        equipment_id: EquipmentId::new(id).unwrap(),
                        model: format!("model-{id}"),
                        firmware: None,
                        session_id: SessionId::new(),
                    })
                }
                Behaviour::Refuse => Err(ConnectionError::Refused {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Behaviour::Silent => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("silent session must be cut off by the timeout")
                }
            };
            self.counters.exit();
            result
        }

        async fn disconnect(&mut self, _reason: Option<&str>) -> Result<(), ConnectionError> {
            self.online = false;
            if self.disconnect_fails {
                return Err(ConnectionError::HandshakeFailed("link reset".to_string()));
            }
            Ok(())
        }

        async fn send_command(
            &mut self,
            name: &str,
            _parameters: &HashMap<String, serde_json::Value>,
            _requested_by: &str,
        ) -> Result<CommandOutcome, ConnectionError> {
            // "hang" models a device that accepted the link but never
            // replies to the command.
            if name == "hang" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(CommandOutcome {
                is_successful: name != "fail-me",
                result_message: Some("done".to_string()),
                error_message: None,
            })
        }

        fn is_online(&self) -> bool {
            self.online
        }

        fn last_heartbeat_at(&self) -> Option<Timestamp> {
            self.heartbeat
        }

        async fn probe(&mut self) -> bool {
            self.probe_ok
        }
    }

    struct ScriptedFactory {
        behaviours: HashMap<String, Behaviour>,
        counters: Arc<Counters>,
        disconnect_fails: bool,
    }

    impl ScriptedFactory {
        fn new(behaviours: Vec<(&str, Behaviour)>) -> Self {
            Self {
                behaviours: behaviours
                    .into_iter()
                    .map(|(host, b)| (host.to_string(), b))
                    .collect(),
                counters: Arc::default(),
                disconnect_fails: false,
            }
        }
    }

    impl SessionFactory for ScriptedFactory {
        type Session = ScriptedSession;

        fn create(&self, config: &EndpointConfig) -> Result<Self::Session, ConnectionError> {
            let behaviour = self
                .behaviours
                .get(&config.host)
                .cloned()
                .unwrap_or(Behaviour::Refuse);
            Ok(ScriptedSession {
                behaviour,
                host: config.host.clone(),
                port: config.port,
                online: false,
                heartbeat: None,
                probe_ok: true,
                disconnect_fails: self.disconnect_fails,
                counters: Arc::clone(&self.counters),
            })
        }
    }

    fn endpoint(host: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            port: 5000,
            expected_id: None,
            timeout_seconds: 5,
        }
    }

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_delay: Duration::from_millis(100),
                max_retries: 3,
                jitter: false,
            },
            ..GatewayConfig::default()
        }
    }

    fn manager(
        factory: ScriptedFactory,
    ) -> (
        Arc<ConnectionManager<ScriptedFactory, Arc<InProcessEventBus>>>,
        Arc<InProcessEventBus>,
    ) {
        let bus = Arc::new(InProcessEventBus::new(64));
        let manager = Arc::new(ConnectionManager::new(
            factory,
            Arc::clone(&bus),
            fast_config(),
            CancellationToken::new(),
        ));
        (manager, bus)
    }

    fn answer(id: &'static str) -> Behaviour {
        Behaviour::Answer {
            id,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn should_register_device_and_emit_connected_event_on_success() {
        let (manager, bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", Behaviour::Answer {
                id: "ETCH-01",
                delay: Duration::from_millis(200),
            })]));
        let mut rx = bus.subscribe();

        let mut config = endpoint("10.0.0.5");
        config.timeout_seconds = 30;
        let result = manager.add_and_connect(config).await.unwrap();

        assert_eq!(result.equipment_id.as_str(), "ETCH-01");
        assert!(result.elapsed >= Duration::from_millis(200));

        let status = manager.get_all_status().await;
        assert_eq!(status.len(), 1);
        assert!(status[0].is_connected);

        let mut connected_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.kind() == "connected" {
                connected_events += 1;
            }
        }
        assert_eq!(connected_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_register_nothing_when_endpoint_times_out() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.99", Behaviour::Silent)]));

        let started = tokio::time::Instant::now();
        let result = manager.add_and_connect(endpoint("10.0.0.99")).await;

        assert!(matches!(
            result,
            Err(GatewayError::Connection(ConnectionError::Timeout(5)))
        ));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(manager.get_all_status().await.is_empty());
        assert_eq!(manager.get_statistics().await.failed_connections, 1);
    }

    #[tokio::test]
    async fn should_register_nothing_when_refused() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![("10.0.0.7", Behaviour::Refuse)]));

        let result = manager.add_and_connect(endpoint("10.0.0.7")).await;
        assert!(matches!(result, Err(GatewayError::Connection(_))));
        assert!(manager.registered_ids().await.is_empty());
    }

    #[tokio::test]
    async fn should_reject_invalid_endpoint_before_any_io() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![]));

        let mut config = endpoint("10.0.0.5");
        config.port = 0;
        let result = manager.add_and_connect(config).await;

        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(manager.get_statistics().await.total_connection_attempts, 0);
    }

    #[tokio::test]
    async fn should_fail_on_identity_mismatch_without_registering() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));

        let mut config = endpoint("10.0.0.5");
        config.expected_id = Some(EquipmentId::new("CVD-99").unwrap());
        let result = manager.add_and_connect(config).await;

        assert!(matches!(
            result,
            Err(GatewayError::Connection(ConnectionError::IdentityMismatch { .. }))
        ));
        assert!(manager.registered_ids().await.is_empty());
    }

    #[tokio::test]
    async fn should_reject_duplicate_equipment_id() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![
            ("10.0.0.5", answer("ETCH-01")),
            ("10.0.0.6", answer("ETCH-01")),
        ]));

        manager.add_and_connect(endpoint("10.0.0.5")).await.unwrap();
        let result = manager.add_and_connect(endpoint("10.0.0.6")).await;

        assert!(matches!(
            result,
            Err(GatewayError::Connection(ConnectionError::AlreadyRegistered(_)))
        ));
        assert_eq!(manager.registered_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn should_count_successes_and_failures_independently_of_order() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![
            ("10.0.0.1", answer("EQ-1")),
            ("10.0.0.2", Behaviour::Refuse),
            ("10.0.0.3", answer("EQ-3")),
            ("10.0.0.4", Behaviour::Refuse),
            ("10.0.0.5", answer("EQ-5")),
        ]));

        let endpoints = vec![
            endpoint("10.0.0.1"),
            endpoint("10.0.0.2"),
            endpoint("10.0.0.3"),
            endpoint("10.0.0.4"),
            endpoint("10.0.0.5"),
        ];
        let report = manager.connect_multiple(endpoints, Some(2)).await;

        assert_eq!(report.successful_count, 3);
        assert_eq!(report.failed_count, 2);
        assert!((report.success_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(manager.registered_ids().await.len(), 3);
    }

    #[tokio::test]
    async fn should_not_exceed_concurrency_limit() {
        let behaviours: Vec<_> = (1..=8)
            .map(|i| {
                let host: &'static str = Box::leak(format!("10.0.1.{i}").into_boxed_str());
                let id: &'static str = Box::leak(format!("EQ-{i}").into_boxed_str());
                (host, Behaviour::Answer {
                    id,
                    delay: Duration::from_millis(30),
                })
            })
            .collect();
        let factory = ScriptedFactory::new(behaviours);
        let counters = Arc::clone(&factory.counters);
        let (manager, _bus) = manager(factory);

        let endpoints: Vec<_> = (1..=8).map(|i| endpoint(&format!("10.0.1.{i}"))).collect();
        let report = manager.connect_multiple(endpoints, Some(3)).await;

        assert_eq!(report.successful_count, 8);
        assert!(counters.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn should_return_false_with_no_side_effects_for_unregistered_reconnect() {
        let (manager, bus) = manager(ScriptedFactory::new(vec![]));
        let mut rx = bus.subscribe();

        let id = EquipmentId::new("GHOST-1").unwrap();
        let reconnected = manager.reconnect(&id).await.unwrap();

        assert!(!reconnected);
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.get_statistics().await.total_connection_attempts, 0);
    }

    #[tokio::test]
    async fn should_mark_device_down_when_retries_exhausted() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        // Make every further connect refuse.
        {
            let device = manager.device(&id).await.unwrap();
            let mut entry = device.entry.lock().await;
            entry.session.behaviour = Behaviour::Refuse;
        }

        let reconnected = manager.reconnect(&id).await.unwrap();
        assert!(!reconnected);

        let status = manager.get_all_status().await;
        assert_eq!(status[0].state, EquipmentState::Down);
        assert!(!status[0].is_connected);
        assert_eq!(
            status[0].health,
            fabgate_domain::health::HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn should_reconnect_after_transient_failures() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        let reconnected = manager.reconnect(&id).await.unwrap();
        assert!(reconnected);

        let status = manager.get_all_status().await;
        assert!(status[0].is_connected);
        assert_eq!(status[0].state, EquipmentState::Idle);
    }

    #[tokio::test]
    async fn should_abort_reconnect_when_shutdown_fires() {
        let bus = Arc::new(InProcessEventBus::new(64));
        let shutdown = CancellationToken::new();
        let manager = Arc::new(ConnectionManager::new(
            ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]),
            Arc::clone(&bus),
            fast_config(),
            shutdown.clone(),
        ));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        shutdown.cancel();
        let reconnected = manager.reconnect(&id).await.unwrap();
        assert!(!reconnected);
    }

    #[tokio::test]
    async fn should_answer_status_reads_while_reconnect_is_backing_off() {
        let bus = Arc::new(InProcessEventBus::new(64));
        let config = GatewayConfig {
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(50),
                multiplier: 2.0,
                max_delay: Duration::from_millis(200),
                max_retries: 3,
                jitter: false,
            },
            ..GatewayConfig::default()
        };
        let manager = Arc::new(ConnectionManager::new(
            ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]),
            Arc::clone(&bus),
            config,
            CancellationToken::new(),
        ));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;
        {
            let device = manager.device(&id).await.unwrap();
            device.entry.lock().await.session.behaviour = Behaviour::Refuse;
        }

        let reconnecting = {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            tokio::spawn(async move { manager.reconnect(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The full retry loop runs for ~350ms; a status read issued during
        // the first backoff sleep must not wait it out.
        let status = tokio::time::timeout(Duration::from_millis(40), manager.get_all_status())
            .await
            .expect("status read waited on an in-flight reconnect");
        assert_eq!(status.len(), 1);
        assert!(!status[0].is_connected);

        assert!(!reconnecting.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn should_disconnect_all_despite_per_device_failures() {
        let mut factory = ScriptedFactory::new(vec![
            ("10.0.0.1", answer("EQ-1")),
            ("10.0.0.2", answer("EQ-2")),
        ]);
        factory.disconnect_fails = true;
        let (manager, _bus) = manager(factory);

        manager
            .connect_multiple(vec![endpoint("10.0.0.1"), endpoint("10.0.0.2")], None)
            .await;
        manager.disconnect_all().await;

        for status in manager.get_all_status().await {
            assert!(!status.is_connected);
        }
    }

    #[tokio::test]
    async fn should_track_command_lifecycle_through_send_command() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        let outcome = manager
            .send_command(&id, "start", HashMap::new(), "operator")
            .await
            .unwrap();
        assert!(outcome.is_successful);

        let device = manager.device(&id).await.unwrap();
        let entry = device.entry.lock().await;
        let command = entry.equipment.command_history.last().unwrap();
        assert_eq!(command.status, CommandStatus::Completed);
        assert_eq!(entry.equipment.metrics.total_processed, 1);
        assert_eq!(entry.equipment.metrics.success_count, 1);
        assert!(entry.equipment.metrics.average_processing_time_ms > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_mark_command_timeout_when_equipment_never_replies() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        let result = manager
            .send_command(&id, "hang", HashMap::new(), "operator")
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::Connection(ConnectionError::Timeout(5)))
        ));

        let device = manager.device(&id).await.unwrap();
        let entry = device.entry.lock().await;
        let command = entry.equipment.command_history.last().unwrap();
        assert_eq!(command.status, CommandStatus::Timeout);
        assert_eq!(entry.equipment.metrics.failure_count, 1);
    }

    #[tokio::test]
    async fn should_reject_command_for_unregistered_equipment() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![]));
        let id = EquipmentId::new("GHOST-1").unwrap();

        let result = manager
            .send_command(&id, "start", HashMap::new(), "operator")
            .await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_compute_statistics_from_registry_and_counters() {
        let (manager, _bus) = manager(ScriptedFactory::new(vec![
            ("10.0.0.1", answer("EQ-1")),
            ("10.0.0.2", Behaviour::Refuse),
        ]));

        manager
            .connect_multiple(vec![endpoint("10.0.0.1"), endpoint("10.0.0.2")], None)
            .await;

        let stats = manager.get_statistics().await;
        assert_eq!(stats.total_devices, 1);
        assert_eq!(stats.connected_devices, 1);
        assert_eq!(stats.online_devices, 1);
        assert_eq!(stats.total_connection_attempts, 2);
        assert_eq!(stats.successful_connections, 1);
        assert_eq!(stats.failed_connections, 1);
    }

    #[tokio::test]
    async fn should_restore_durable_fields_from_persisted_aggregate() {
        let (manager, _bus) =
            manager(ScriptedFactory::new(vec![("10.0.0.5", answer("ETCH-01"))]));
        let id = manager
            .add_and_connect(endpoint("10.0.0.5"))
            .await
            .unwrap()
            .equipment_id;

        let mut persisted = Equipment::builder()
            .id(id.clone())
            .name("Etcher bay 1")
            .created_by("installer")
            .build()
            .unwrap();
        persisted.record_processing_result(true, 120.0);

        assert!(manager.restore_persisted(persisted).await);

        let status = manager.get_all_status().await;
        assert_eq!(status[0].name, "Etcher bay 1");
        assert!(status[0].is_connected);

        let device = manager.device(&id).await.unwrap();
        let entry = device.entry.lock().await;
        assert_eq!(entry.equipment.metrics.total_processed, 1);
        assert_eq!(entry.equipment.created_by.as_deref(), Some("installer"));

        let ghost = Equipment::builder()
            .id(EquipmentId::new("GHOST-1").unwrap())
            .name("Ghost")
            .build()
            .unwrap();
        assert!(!manager.restore_persisted(ghost).await);
    }
}
