use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldops_catalog::{CatalogEntry, CatalogRepository, ItemType, Technician, TechnicianRepository};
use fieldops_core::{CoreResult, GeoPoint, Role, UserDirectory, UserRecord};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, db_err};

/// Users, technician profiles and the price catalog. These are owned by
/// other collaborators; the engine only reads them.
pub struct StoreDirectory {
    pool: PgPool,
}

impl StoreDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    role: String,
}

impl UserRow {
    fn into_record(self) -> CoreResult<UserRecord> {
        let role: Role = self.role.parse().map_err(|_| corrupt("users.role", &self.role))?;
        Ok(UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TechnicianRow {
    id: Uuid,
    name: String,
    qualification: String,
    latitude: f64,
    longitude: f64,
    available_from: DateTime<Utc>,
    rating: f64,
}

impl From<TechnicianRow> for Technician {
    fn from(row: TechnicianRow) -> Self {
        Technician {
            id: row.id,
            name: row.name,
            qualification: row.qualification,
            location: GeoPoint::new(row.latitude, row.longitude),
            available_from: row.available_from,
            rating: row.rating,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    id: Uuid,
    item_type: String,
    name: String,
    price: Decimal,
}

#[async_trait]
impl UserDirectory for StoreDirectory {
    async fn find_user(&self, id: Uuid) -> CoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, name, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(UserRow::into_record).transpose()
    }
}

#[async_trait]
impl TechnicianRepository for StoreDirectory {
    async fn candidates(&self, qualification: &str) -> CoreResult<Vec<Technician>> {
        let rows = sqlx::query_as::<_, TechnicianRow>(
            r#"
            SELECT t.id, t.name, t.qualification, t.latitude, t.longitude, t.available_from, t.rating
            FROM technicians t
            JOIN users u ON u.id = t.id AND u.role = 'technician'
            WHERE t.qualification = $1
            "#,
        )
        .bind(qualification)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Technician::from).collect())
    }
}

#[async_trait]
impl CatalogRepository for StoreDirectory {
    async fn find_entry(&self, item_type: ItemType, id: Uuid) -> CoreResult<Option<CatalogEntry>> {
        let row = sqlx::query_as::<_, CatalogRow>(
            "SELECT id, item_type, name, price FROM catalog_items WHERE id = $1 AND item_type = $2",
        )
        .bind(id)
        .bind(item_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let item_type = r
                .item_type
                .parse::<ItemType>()
                .map_err(|_| corrupt("catalog_items.item_type", &r.item_type))?;
            Ok(CatalogEntry {
                id: r.id,
                item_type,
                name: r.name,
                price: r.price,
            })
        })
        .transpose()
    }
}
