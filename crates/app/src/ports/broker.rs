//! Broker port — publish contract towards the message broker.
//!
//! The transport (MQTT, AMQP, …) is the adapter's business; the core only
//! publishes JSON payloads under a topic.

use std::future::Future;

use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

/// Publishes equipment events to downstream manufacturing systems.
pub trait EventBroker: Send + Sync {
    /// Publish `payload` for `equipment_id` under `topic`.
    fn publish(
        &self,
        equipment_id: &EquipmentId,
        topic: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

impl<T: EventBroker> EventBroker for std::sync::Arc<T> {
    fn publish(
        &self,
        equipment_id: &EquipmentId,
        topic: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).publish(equipment_id, topic, payload)
    }
}
