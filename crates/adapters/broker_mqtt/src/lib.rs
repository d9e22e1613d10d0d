//! # fabgate-adapter-broker-mqtt
//!
//! MQTT adapter — implements the [`EventBroker`] port on top of
//! [`rumqttc`]. Equipment events are published as JSON under
//! `{base}/equipment/{id}/{channel}`, where `channel` is chosen by the
//! propagation pipeline (`status` or `critical`).
//!
//! The rumqttc event loop runs as a background task owned by this crate;
//! it reconnects on its own after transport errors, so a broker outage
//! only delays publishes instead of tearing the gateway down.
//!
//! ## Dependency rule
//! Depends on `fabgate-app` (port traits) and `fabgate-domain` only.

mod config;
mod error;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use tokio_util::sync::CancellationToken;

use fabgate_app::ports::EventBroker;
use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

pub use config::MqttConfig;
pub use error::MqttError;

/// Pause after an event-loop error before polling again.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// MQTT-backed implementation of the [`EventBroker`] port.
pub struct MqttBroker {
    client: AsyncClient,
    config: MqttConfig,
    qos: QoS,
}

impl MqttBroker {
    /// Connect to the broker and spawn the background event loop.
    ///
    /// The loop runs until `shutdown` fires; transport errors are logged
    /// and rumqttc re-establishes the connection on the next poll.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] when the configured QoS is out of
    /// range. Transport problems surface later, per publish.
    pub fn start(config: MqttConfig, shutdown: CancellationToken) -> Result<Self, MqttError> {
        let qos = parse_qos(config.qos)?;

        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));

        let (client, mut event_loop) = AsyncClient::new(options, config.channel_capacity);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    polled = event_loop.poll() => match polled {
                        Ok(Event::Incoming(incoming)) => {
                            tracing::trace!(?incoming, "mqtt incoming");
                        }
                        Ok(Event::Outgoing(_)) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "mqtt event loop error, reconnecting");
                            tokio::time::sleep(RECONNECT_PAUSE).await;
                        }
                    },
                }
            }
            tracing::info!("mqtt event loop stopped");
        });

        Ok(Self {
            client,
            config,
            qos,
        })
    }
}

fn parse_qos(qos: u8) -> Result<QoS, MqttError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}

impl EventBroker for MqttBroker {
    async fn publish(
        &self,
        equipment_id: &EquipmentId,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let full_topic = self.config.topic_for(equipment_id.as_str(), topic);
        let body = serde_json::to_vec(&payload).map_err(MqttError::PayloadSerialize)?;

        self.client
            .publish(&full_topic, self.qos, false, body)
            .await
            .map_err(MqttError::Client)?;

        tracing::debug!(topic = %full_topic, "event published");
        Ok(())
    }
}
