//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the use-case layer
//! and the adapter layer can depend on them without creating circular
//! dependencies.

pub mod broker;
pub mod cache;
pub mod event_bus;
pub mod repository;
pub mod session;

pub use broker::EventBroker;
pub use cache::StatusCache;
pub use event_bus::EventPublisher;
pub use repository::EquipmentRepository;
pub use session::{CommandOutcome, DeviceSession, SessionFactory, SessionMetadata};
