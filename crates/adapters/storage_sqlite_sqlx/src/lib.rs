//! # fabgate-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using sqlx — implements the
//! [`EquipmentRepository`](fabgate_app::ports::EquipmentRepository) port.
//!
//! ## Responsibilities
//! - Own the connection pool and run migrations on startup
//! - Persist equipment aggregates as JSON documents with queryable
//!   id/name/state/health columns
//! - Map sqlx failures into [`StorageError`] and onwards into
//!   `GatewayError::Storage`
//!
//! ## Dependency rule
//! Depends on `fabgate-app` (port traits) and `fabgate-domain` only.

mod equipment_repo;
mod error;
mod pool;

pub use equipment_repo::SqliteEquipmentRepository;
pub use error::StorageError;
pub use pool::{Config, Database};
