//! Periodic health monitor over the connection registry.
//!
//! Sweeps every registered device on a fixed interval: pulls heartbeat
//! freshness into the aggregate, probes connectivity, and schedules one
//! reconnection for each device that went stale. Per-device failures are
//! contained to that device; the sweep always finishes and the loop only
//! stops on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::manager::{ConnectionManager, HealthVerdict};
use crate::ports::{EventPublisher, SessionFactory};

/// Pause after a sweep that hit per-device errors, so a systemic failure
/// (e.g. the registry's backing store misbehaving) does not spin the loop.
const ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Outcome of one sweep over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub checked: usize,
    pub healthy: usize,
    /// Devices flagged stale this sweep; one reconnect was scheduled for
    /// each.
    pub flagged: usize,
    pub errors: usize,
}

/// Supervised background loop driving [`ConnectionManager::check_health`].
pub struct HealthMonitor<F: SessionFactory, P> {
    manager: Arc<ConnectionManager<F, P>>,
    check_interval: Duration,
    shutdown: CancellationToken,
}

impl<F, P> HealthMonitor<F, P>
where
    F: SessionFactory + Send + Sync + 'static,
    F::Session: Send,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(
        manager: Arc<ConnectionManager<F, P>>,
        check_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            check_interval,
            shutdown,
        }
    }

    /// Run the monitor until the shutdown token fires.
    ///
    /// Meant to be spawned as a background task next to the server loop.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately; skip it
        // so freshly connected devices are not swept right away.
        ticker.tick().await;

        tracing::info!(interval_secs = self.check_interval.as_secs(), "health monitor started");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let stats = self.sweep().await;
            tracing::debug!(
                checked = stats.checked,
                healthy = stats.healthy,
                flagged = stats.flagged,
                errors = stats.errors,
                "health sweep finished"
            );

            if stats.errors > 0 {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(ERROR_PAUSE) => {}
                }
            }
        }
        tracing::info!("health monitor stopped");
    }

    /// Check every registered device once.
    ///
    /// Each stale device gets exactly one reconnection scheduled, running
    /// detached under the manager's backoff policy so a slow reconnect
    /// never delays the next sweep.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        for id in self.manager.registered_ids().await {
            stats.checked += 1;
            match self.manager.check_health(&id).await {
                Ok(HealthVerdict::Healthy) => stats.healthy += 1,
                Ok(HealthVerdict::Stale) => {
                    stats.flagged += 1;
                    let manager = Arc::clone(&self.manager);
                    tokio::spawn(async move {
                        match manager.reconnect(&id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(equipment_id = %id, "scheduled reconnect gave up");
                            }
                            Err(err) => {
                                tracing::error!(equipment_id = %id, error = %err, "scheduled reconnect failed");
                            }
                        }
                    });
                }
                Ok(HealthVerdict::NotConnected) => {}
                // Typically a device unregistered between listing and
                // checking; never aborts the sweep.
                Err(err) => {
                    stats.errors += 1;
                    tracing::warn!(equipment_id = %id, error = %err, "health check failed");
                }
            }
        }

        stats
    }
}
