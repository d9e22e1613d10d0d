//! Throughput metrics tracked per equipment.

use serde::{Deserialize, Serialize};

/// Processing counters and a running average of processing time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentMetrics {
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_processing_time_ms: f64,
}

impl EquipmentMetrics {
    /// Fold one processing result into the counters and running average.
    pub fn record(&mut self, success: bool, duration_ms: f64) {
        let previous_total = self.total_processed as f64;
        self.total_processed += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.average_processing_time_ms = (self.average_processing_time_ms * previous_total
            + duration_ms)
            / self.total_processed as f64;
    }

    /// Fraction of processed units that succeeded, 0.0 when nothing has
    /// been processed yet.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_processed as f64
        }
    }
}
