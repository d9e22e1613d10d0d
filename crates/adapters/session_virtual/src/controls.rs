//! Runtime fault-injection controls shared between a virtual session and
//! the code driving the simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fault flags for one simulated equipment.
#[derive(Debug, Default)]
pub struct VirtualControls {
    refuse_connections: AtomicBool,
    pause_heartbeats: AtomicBool,
    fail_commands: AtomicBool,
}

/// Cloneable handle to one equipment's [`VirtualControls`].
#[derive(Debug, Default, Clone)]
pub struct ControlsHandle(Arc<VirtualControls>);

impl ControlsHandle {
    pub fn refuse_connections(&self, refuse: bool) {
        self.0.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn pause_heartbeats(&self, pause: bool) {
        self.0.pause_heartbeats.store(pause, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.0.fail_commands.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn refuses_connections(&self) -> bool {
        self.0.refuse_connections.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn heartbeats_paused(&self) -> bool {
        self.0.pause_heartbeats.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fails_commands(&self) -> bool {
        self.0.fail_commands.load(Ordering::SeqCst)
    }
}
