//! Gateway and endpoint configuration, validated before any IO.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use fabgate_domain::error::ValidationError;
use fabgate_domain::id::EquipmentId;

use crate::retry::BackoffPolicy;

/// Minimum allowed connect timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 5;
/// Maximum allowed connect timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// One equipment endpoint to connect to.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// IP address or hostname.
    pub host: String,
    /// TCP port, 1–65535.
    pub port: u16,
    /// When set, the equipment must identify itself with this id during
    /// the handshake.
    #[serde(default)]
    pub expected_id: Option<EquipmentId>,
    /// Connect timeout in seconds, 5–300.
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl EndpointConfig {
    /// Check the endpoint invariants without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for an invalid host, a zero port, or a
    /// timeout outside 5–300 seconds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_host(&self.host) {
            return Err(ValidationError::InvalidHost {
                host: self.host.clone(),
            });
        }
        if self.port == 0 {
            return Err(ValidationError::PortOutOfRange);
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_seconds) {
            return Err(ValidationError::TimeoutOutOfRange {
                value: self.timeout_seconds,
                min: MIN_TIMEOUT_SECS,
                max: MAX_TIMEOUT_SECS,
            });
        }
        Ok(())
    }

    /// The connect timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Either a literal IP address or an RFC 1123 hostname.
fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Tunables for the connection manager and health monitor.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Concurrency cap for bulk connects.
    pub max_concurrency: usize,
    /// How often the health monitor sweeps the registry.
    pub check_interval: Duration,
    /// Max time since last heartbeat before a connection is deemed stale.
    pub staleness_threshold: Duration,
    /// Expected heartbeat cadence, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reconnection backoff policy.
    pub backoff: BackoffPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            check_interval: Duration::from_secs(30),
            staleness_threshold: Duration::from_secs(15 * 60),
            heartbeat_interval_secs: 60,
            backoff: BackoffPolicy::default(),
        }
    }
}
