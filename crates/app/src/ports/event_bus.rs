//! Event bus port — publish/subscribe for domain events.

use std::future::Future;

use fabgate_domain::error::GatewayError;
use fabgate_domain::event::EquipmentEvent;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(
        &self,
        event: EquipmentEvent,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: EquipmentEvent,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).publish(event)
    }
}
