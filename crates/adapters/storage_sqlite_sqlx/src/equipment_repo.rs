//! `SQLite` implementation of [`EquipmentRepository`].
//!
//! The aggregate is stored as a JSON document; id, name, state, health,
//! and the update timestamp are mirrored into columns so operators can
//! query the table directly.

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fabgate_app::ports::EquipmentRepository;
use fabgate_domain::equipment::Equipment;
use fabgate_domain::error::GatewayError;
use fabgate_domain::id::EquipmentId;

use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`Equipment`].
struct Wrapper(Equipment);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Equipment> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let document: String = row.try_get("document")?;
        let equipment = serde_json::from_str(&document)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        Ok(Self(equipment))
    }
}

const INSERT: &str =
    "INSERT INTO equipment (id, name, state, health, document, updated_at) VALUES (?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT document FROM equipment WHERE id = ?";
const SELECT_ALL: &str = "SELECT document FROM equipment";
const UPDATE: &str =
    "UPDATE equipment SET name = ?, state = ?, health = ?, document = ?, updated_at = ? WHERE id = ?";

/// `SQLite`-backed equipment repository.
pub struct SqliteEquipmentRepository {
    pool: SqlitePool,
}

impl SqliteEquipmentRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl EquipmentRepository for SqliteEquipmentRepository {
    fn get_by_id(
        &self,
        id: &EquipmentId,
    ) -> impl Future<Output = Result<Option<Equipment>, GatewayError>> + Send {
        let pool = self.pool.clone();
        let id = id.to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn add(
        &self,
        equipment: Equipment,
    ) -> impl Future<Output = Result<Equipment, GatewayError>> + Send {
        let pool = self.pool.clone();
        async move {
            let document = serde_json::to_string(&equipment).map_err(StorageError::from)?;
            sqlx::query(INSERT)
                .bind(equipment.id.to_string())
                .bind(&equipment.name)
                .bind(equipment.state.to_string())
                .bind(equipment.health.to_string())
                .bind(document)
                .bind(equipment.updated_at.to_rfc3339())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(equipment)
        }
    }

    fn update(
        &self,
        equipment: Equipment,
    ) -> impl Future<Output = Result<Equipment, GatewayError>> + Send {
        let pool = self.pool.clone();
        async move {
            let document = serde_json::to_string(&equipment).map_err(StorageError::from)?;
            sqlx::query(UPDATE)
                .bind(&equipment.name)
                .bind(equipment.state.to_string())
                .bind(equipment.health.to_string())
                .bind(document)
                .bind(equipment.updated_at.to_rfc3339())
                .bind(equipment.id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(equipment)
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Equipment>, GatewayError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }
}
