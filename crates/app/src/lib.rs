//! # fabgate-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceSession` / `SessionFactory` — one live protocol session per equipment
//!   - `StatusCache` — fast snapshot store for downstream readers
//!   - `EventBroker` — publish contract towards the message broker
//!   - `EquipmentRepository` — durable aggregate persistence
//! - Provide the **connection manager**: registry of sessions keyed by
//!   equipment id, bounded-concurrency bulk connect, reconnection with
//!   backoff, statistics
//! - Provide the **health monitor**: supervised background sweep flagging
//!   stale connections and scheduling reconnects
//! - Provide the **event propagation pipeline**: fan domain events out to
//!   cache and broker with per-sink failure isolation
//! - Provide **in-process infrastructure** (event bus, status cache) that
//!   doesn't need IO
//!
//! ## Dependency rule
//! Depends on `fabgate-domain` only (plus `tokio::sync` for channels and
//! `tokio-util` for cancellation). Never imports adapter crates. Adapters
//! depend on *this* crate, not the reverse.

pub mod cache;
pub mod config;
pub mod event_bus;
pub mod manager;
pub mod monitor;
pub mod ports;
pub mod propagation;
pub mod retry;
pub mod snapshot;
