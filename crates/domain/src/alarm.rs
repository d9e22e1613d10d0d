//! Alarms raised by equipment.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Severity of an equipment alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSeverity {
    Info,
    Warning,
    Critical,
}

/// An active alarm on a piece of equipment, keyed by its `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub code: String,
    pub text: String,
    pub severity: AlarmSeverity,
    pub raised_at: Timestamp,
}

impl Alarm {
    /// Create an alarm raised now.
    #[must_use]
    pub fn new(code: impl Into<String>, text: impl Into<String>, severity: AlarmSeverity) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
            severity,
            raised_at: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_order_severities_from_info_to_critical() {
        assert!(AlarmSeverity::Info < AlarmSeverity::Warning);
        assert!(AlarmSeverity::Warning < AlarmSeverity::Critical);
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let alarm = Alarm::new("AL-204", "chamber pressure high", AlarmSeverity::Critical);
        let json = serde_json::to_string(&alarm).unwrap();
        let parsed: Alarm = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, alarm);
    }
}
