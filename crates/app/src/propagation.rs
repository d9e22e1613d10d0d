//! Event propagation pipeline — fans domain events out to the status
//! cache and the message broker.
//!
//! The two sinks are independent legs: a failing cache never stops the
//! broker publish and vice versa. The pipeline itself never fails; every
//! outcome is reported through [`PropagationReport`] and logged.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use fabgate_domain::event::{EquipmentEvent, EventPayload};
use fabgate_domain::id::EquipmentId;

use crate::ports::{EventBroker, StatusCache};
use crate::snapshot::EquipmentStatusSnapshot;

/// Broker topic for routine status events.
pub const TOPIC_STATUS: &str = "status";
/// Broker topic for critical events operators subscribe to directly.
pub const TOPIC_CRITICAL: &str = "critical";

/// Outcome of propagating one event to both sinks.
#[derive(Debug)]
pub struct PropagationReport {
    pub equipment_id: EquipmentId,
    pub event_kind: &'static str,
    pub cache_ok: bool,
    pub broker_ok: bool,
    pub errors: Vec<String>,
}

impl PropagationReport {
    /// Whether both sinks accepted the event.
    #[must_use]
    pub fn is_fully_propagated(&self) -> bool {
        self.cache_ok && self.broker_ok
    }
}

/// Fans each [`EquipmentEvent`] out to the cache and the broker.
pub struct PropagationPipeline<C, B> {
    cache: C,
    broker: B,
}

impl<C, B> PropagationPipeline<C, B>
where
    C: StatusCache,
    B: EventBroker,
{
    pub fn new(cache: C, broker: B) -> Self {
        Self { cache, broker }
    }

    /// Propagate one event to both sinks, each leg isolated from the
    /// other's failure.
    pub async fn handle(&self, event: &EquipmentEvent) -> PropagationReport {
        let mut errors = Vec::new();

        let cache_ok = match self.cache.get(&event.equipment_id).await {
            Ok(existing) => {
                // A cold cache starts from the default snapshot; it must
                // never fail the pipeline.
                let snapshot = existing.unwrap_or_else(|| {
                    EquipmentStatusSnapshot::default_for(event.equipment_id.clone())
                });
                let updated = apply_event(snapshot, event);
                match self.cache.set(updated).await {
                    Ok(()) => true,
                    Err(err) => {
                        errors.push(format!("cache set: {err}"));
                        false
                    }
                }
            }
            Err(err) => {
                errors.push(format!("cache get: {err}"));
                false
            }
        };

        let topic = if event.is_critical() {
            TOPIC_CRITICAL
        } else {
            TOPIC_STATUS
        };
        let broker_ok = match serde_json::to_value(event) {
            Ok(payload) => match self.broker.publish(&event.equipment_id, topic, payload).await {
                Ok(()) => true,
                Err(err) => {
                    errors.push(format!("broker publish: {err}"));
                    false
                }
            },
            Err(err) => {
                errors.push(format!("event serialization: {err}"));
                false
            }
        };

        if !errors.is_empty() {
            tracing::warn!(
                equipment_id = %event.equipment_id,
                event_kind = event.kind(),
                errors = ?errors,
                "event partially propagated"
            );
        }

        PropagationReport {
            equipment_id: event.equipment_id.clone(),
            event_kind: event.kind(),
            cache_ok,
            broker_ok,
            errors,
        }
    }

    /// Consume events from `receiver` until the channel closes or the
    /// shutdown token fires.
    ///
    /// A lagged receiver (events dropped by the broadcast channel under
    /// backpressure) is logged and consumption continues from the oldest
    /// retained event.
    pub async fn run(
        &self,
        mut receiver: broadcast::Receiver<EquipmentEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("propagation pipeline started");
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "propagation lagged behind event bus");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            self.handle(&event).await;
        }
        tracing::info!("propagation pipeline stopped");
    }
}

/// Fold one event into a cached snapshot, returning the replacement.
fn apply_event(
    snapshot: EquipmentStatusSnapshot,
    event: &EquipmentEvent,
) -> EquipmentStatusSnapshot {
    use fabgate_domain::connection::ConnectionState;

    if let Some(delta) = event.connection_delta() {
        return snapshot.with_connection(&delta.apply(&ConnectionState::default()));
    }

    match &event.payload {
        EventPayload::StateChanged { current, .. } => snapshot.with_state(*current),
        EventPayload::HealthChanged { current, .. } => snapshot.with_health(*current),
        EventPayload::BasicInfoUpdated { name, .. } => snapshot.with_name(name.clone()),
        _ => snapshot,
    }
}
