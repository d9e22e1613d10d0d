//! MQTT broker adapter configuration.

use serde::Deserialize;

/// Configuration for the MQTT broker connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Base topic prefix for all gateway MQTT communication.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Quality of service for published events, 0–2.
    pub qos: u8,
    /// Capacity of the outgoing request channel.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "fabgate".to_string(),
            base_topic: "fabgate".to_string(),
            keep_alive_secs: 30,
            qos: 1,
            channel_capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Full topic for an equipment event:
    /// `{base}/equipment/{equipment_id}/{channel}`.
    #[must_use]
    pub fn topic_for(&self, equipment_id: &str, channel: &str) -> String {
        format!("{}/equipment/{equipment_id}/{channel}", self.base_topic)
    }
}
