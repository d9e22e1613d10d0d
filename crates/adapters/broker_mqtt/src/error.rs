//! MQTT adapter error types.

use fabgate_domain::error::GatewayError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The configured QoS is not 0, 1, or 2.
    #[error("invalid QoS {0}, must be 0, 1, or 2")]
    InvalidQos(u8),

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to serialize the outgoing payload as JSON.
    #[error("failed to serialize MQTT payload")]
    PayloadSerialize(#[source] serde_json::Error),
}

impl From<MqttError> for GatewayError {
    fn from(err: MqttError) -> Self {
        GatewayError::Propagation(err.to_string())
    }
}
