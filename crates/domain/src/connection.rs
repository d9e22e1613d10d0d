//! Connection state — an immutable snapshot of one equipment's network
//! session.
//!
//! Every transition (`connected`, `disconnected`, `heartbeat`,
//! `retry_attempted`) is a pure function returning a new snapshot; nothing
//! is ever mutated in place. Quality is re-derived on each transition from
//! heartbeat recency and the retry count.

use serde::{Deserialize, Serialize};

use crate::id::SessionId;
use crate::time::Timestamp;

/// Default expected heartbeat interval, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Default number of reconnection attempts before a device is considered
/// failed.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Subjective quality of a connection, derived from heartbeat recency and
/// retry pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    #[default]
    Unknown,
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Immutable snapshot of one equipment's network connection.
///
/// Invariant: `is_connected == true` implies `session_id` and
/// `last_connected_at` are set; disconnecting always clears the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub session_id: Option<SessionId>,
    pub last_connected_at: Option<Timestamp>,
    pub last_disconnected_at: Option<Timestamp>,
    pub disconnect_reason: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub quality: ConnectionQuality,
    pub last_heartbeat_at: Option<Timestamp>,
    /// Expected heartbeat cadence, used for quality derivation.
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_HEARTBEAT_INTERVAL_SECS)
    }
}

impl ConnectionState {
    /// A never-connected snapshot with the given retry budget and expected
    /// heartbeat cadence.
    #[must_use]
    pub fn new(max_retries: u32, heartbeat_interval_secs: u64) -> Self {
        Self {
            is_connected: false,
            session_id: None,
            last_connected_at: None,
            last_disconnected_at: None,
            disconnect_reason: None,
            retry_count: 0,
            max_retries,
            quality: ConnectionQuality::Unknown,
            last_heartbeat_at: None,
            heartbeat_interval_secs,
        }
    }

    /// Snapshot after a successful connect at `at`.
    ///
    /// Resets the retry counter and records a heartbeat at the same instant.
    #[must_use]
    pub fn connected(&self, session_id: SessionId, at: Timestamp) -> Self {
        let mut next = Self {
            is_connected: true,
            session_id: Some(session_id),
            last_connected_at: Some(at),
            disconnect_reason: None,
            retry_count: 0,
            last_heartbeat_at: Some(at),
            ..self.clone()
        };
        next.quality = next.derive_quality(at);
        next
    }

    /// Snapshot after a disconnect at `at`.
    ///
    /// Idempotent: safe from any prior state, always clears the session.
    #[must_use]
    pub fn disconnected(&self, reason: Option<&str>, at: Timestamp) -> Self {
        Self {
            is_connected: false,
            session_id: None,
            last_disconnected_at: Some(at),
            disconnect_reason: reason.map(str::to_string),
            quality: ConnectionQuality::Unknown,
            ..self.clone()
        }
    }

    /// Snapshot after receiving a heartbeat at `at`.
    #[must_use]
    pub fn heartbeat(&self, at: Timestamp) -> Self {
        let mut next = Self {
            last_heartbeat_at: Some(at),
            ..self.clone()
        };
        next.quality = next.derive_quality(at);
        next
    }

    /// Snapshot after a failed reconnection attempt.
    #[must_use]
    pub fn retry_attempted(&self) -> Self {
        let mut next = Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        };
        let reference = next.last_heartbeat_at.unwrap_or_else(crate::time::now);
        next.quality = next.derive_quality(reference);
        next
    }

    /// Whether the connection is considered stable.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.is_connected && self.retry_count < 3
    }

    /// How long ago the last heartbeat was seen, relative to `now`.
    #[must_use]
    pub fn heartbeat_age(&self, now: Timestamp) -> Option<chrono::Duration> {
        self.last_heartbeat_at.map(|hb| now - hb)
    }

    fn derive_quality(&self, now: Timestamp) -> ConnectionQuality {
        if !self.is_connected {
            return ConnectionQuality::Unknown;
        }
        let Some(age) = self.heartbeat_age(now) else {
            return ConnectionQuality::Unknown;
        };
        let interval = chrono::Duration::seconds(self.heartbeat_interval_secs.min(i64::MAX as u64) as i64);

        if self.retry_count == 0 && age <= interval {
            ConnectionQuality::Excellent
        } else if self.retry_count <= 1 && age <= interval * 2 {
            ConnectionQuality::Good
        } else if self.retry_count <= self.max_retries / 2 {
            ConnectionQuality::Fair
        } else {
            ConnectionQuality::Poor
        }
    }
}
