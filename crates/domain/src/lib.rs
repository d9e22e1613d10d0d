//! # fabgate-domain
//!
//! Pure domain model for the fabgate equipment gateway.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Equipment** (the aggregate root for one manufacturing tool)
//! - Define **EquipmentState** (operational state machine + predicates)
//! - Define **ConnectionState** (immutable connection snapshot + quality)
//! - Define **Alarms** and **Remote Commands** (bounded history)
//! - Define **Domain Events** (immutable records of aggregate changes)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod alarm;
pub mod command;
pub mod connection;
pub mod equipment;
pub mod event;
pub mod health;
pub mod metrics;
pub mod state;
