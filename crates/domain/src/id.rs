//! Typed identifiers — a validated string id for equipment, UUID newtypes
//! for everything else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of an [`EquipmentId`], in characters.
pub const EQUIPMENT_ID_MAX_LEN: usize = 50;

/// Opaque identifier for a piece of equipment.
///
/// Assigned by the plant (not generated): 1–50 characters, limited to
/// ASCII alphanumerics, underscore, and hyphen. Value-equal and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EquipmentId(String);

impl EquipmentId {
    /// Validate and wrap an equipment identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEquipmentId`] when the value is
    /// empty, longer than [`EQUIPMENT_ID_MAX_LEN`], or contains characters
    /// outside `[A-Za-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::InvalidEquipmentId {
                id: value,
                reason: "must not be empty",
            });
        }
        if value.chars().count() > EQUIPMENT_ID_MAX_LEN {
            return Err(ValidationError::InvalidEquipmentId {
                id: value,
                reason: "exceeds 50 characters",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidEquipmentId {
                id: value,
                reason: "contains characters outside [A-Za-z0-9_-]",
            });
        }
        Ok(Self(value))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EquipmentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EquipmentId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EquipmentId> for String {
    fn from(id: EquipmentId) -> Self {
        id.0
    }
}

macro_rules! define_uuid_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_uuid_id!(
    /// Unique identifier for a [`domain event`](crate::event::EquipmentEvent).
    EventId
);

define_uuid_id!(
    /// Unique identifier for a [`RemoteCommand`](crate::command::RemoteCommand).
    CommandId
);

define_uuid_id!(
    /// Identifier of one live protocol session with a piece of equipment.
    SessionId
);
