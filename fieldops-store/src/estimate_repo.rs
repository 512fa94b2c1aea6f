use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldops_core::{CoreError, CoreResult};
use fieldops_estimate::{Estimate, EstimateItem, EstimateRepository, EstimateScope, EstimateStatus};
use fieldops_order::Order;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{corrupt, db_err};
use crate::order_repo::{insert_order_on, LineRow};

pub struct StoreEstimateRepository {
    pool: PgPool,
}

impl StoreEstimateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EstimateRow {
    id: Uuid,
    client_id: Uuid,
    technician_id: Option<Uuid>,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
    status: String,
    description: Option<String>,
    payment_terms: Option<String>,
    service_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    job_number: Option<String>,
    converted_order_id: Option<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ESTIMATE_COLUMNS: &str = "id, client_id, technician_id, discount, tax, total, status, description, \
     payment_terms, service_date, due_date, job_number, converted_order_id, version, created_at, updated_at";

impl EstimateRow {
    fn into_estimate(self, lines: Vec<LineRow>) -> CoreResult<Estimate> {
        let status = EstimateStatus::parse(&self.status)
            .ok_or_else(|| corrupt("estimates.status", &self.status))?;

        let items = lines
            .into_iter()
            .map(|line| {
                Ok(EstimateItem {
                    item_type: line.item_type()?,
                    id: line.id,
                    estimate_id: line.parent_id,
                    item_id: line.item_id,
                    description: line.description,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    total: line.total,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Estimate {
            id: self.id,
            client_id: self.client_id,
            technician_id: self.technician_id,
            items,
            discount: self.discount,
            tax: self.tax,
            total: self.total,
            status,
            description: self.description,
            payment_terms: self.payment_terms,
            service_date: self.service_date,
            due_date: self.due_date,
            job_number: self.job_number,
            converted_order_id: self.converted_order_id,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn insert_items_on(conn: &mut PgConnection, estimate: &Estimate) -> CoreResult<()> {
    for (position, item) in estimate.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO estimate_items (id, estimate_id, item_type, item_id, description, quantity, unit_price, total, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(estimate.id)
        .bind(item.item_type.as_str())
        .bind(item.item_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total)
        .bind(position as i32)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

/// Version-guarded write of the scalar columns. `None` means the row moved
/// or disappeared.
async fn write_estimate_on(conn: &mut PgConnection, estimate: &Estimate) -> CoreResult<Option<i64>> {
    sqlx::query_scalar(
        r#"
        UPDATE estimates SET
            technician_id = $3, discount = $4, tax = $5, total = $6, status = $7, description = $8,
            payment_terms = $9, service_date = $10, due_date = $11, job_number = $12,
            converted_order_id = $13, updated_at = $14, version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING version
        "#,
    )
    .bind(estimate.id)
    .bind(estimate.version)
    .bind(estimate.technician_id)
    .bind(estimate.discount)
    .bind(estimate.tax)
    .bind(estimate.total)
    .bind(estimate.status.as_str())
    .bind(&estimate.description)
    .bind(&estimate.payment_terms)
    .bind(estimate.service_date)
    .bind(estimate.due_date)
    .bind(&estimate.job_number)
    .bind(estimate.converted_order_id)
    .bind(estimate.updated_at)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)
}

async fn load_lines(pool: &PgPool, ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<LineRow>>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT id, estimate_id AS parent_id, item_type, item_id, description, quantity, unit_price, total
        FROM estimate_items WHERE estimate_id = ANY($1) ORDER BY estimate_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let mut grouped: HashMap<Uuid, Vec<LineRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.parent_id).or_default().push(row);
    }
    Ok(grouped)
}

fn with_version(estimate: &Estimate, version: i64) -> Estimate {
    let mut saved = estimate.clone();
    saved.version = version;
    saved
}

#[async_trait]
impl EstimateRepository for StoreEstimateRepository {
    async fn insert_estimate(&self, estimate: &Estimate) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO estimates (id, client_id, technician_id, discount, tax, total, status, description,
                payment_terms, service_date, due_date, job_number, converted_order_id, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(estimate.id)
        .bind(estimate.client_id)
        .bind(estimate.technician_id)
        .bind(estimate.discount)
        .bind(estimate.tax)
        .bind(estimate.total)
        .bind(estimate.status.as_str())
        .bind(&estimate.description)
        .bind(&estimate.payment_terms)
        .bind(estimate.service_date)
        .bind(estimate.due_date)
        .bind(&estimate.job_number)
        .bind(estimate.converted_order_id)
        .bind(estimate.version)
        .bind(estimate.created_at)
        .bind(estimate.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_items_on(&mut tx, estimate).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_estimate(&self, id: Uuid) -> CoreResult<Option<Estimate>> {
        let row = sqlx::query_as::<_, EstimateRow>(&format!(
            "SELECT {} FROM estimates WHERE id = $1",
            ESTIMATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let mut lines = load_lines(&self.pool, &[id]).await?;
                Ok(Some(row.into_estimate(lines.remove(&id).unwrap_or_default())?))
            }
            None => Ok(None),
        }
    }

    async fn list_estimates(&self, scope: &EstimateScope) -> CoreResult<Vec<Estimate>> {
        let rows = sqlx::query_as::<_, EstimateRow>(&format!(
            r#"
            SELECT {} FROM estimates
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR technician_id = $2)
            ORDER BY created_at DESC
            "#,
            ESTIMATE_COLUMNS
        ))
        .bind(scope.client_id)
        .bind(scope.technician_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines = load_lines(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let items = lines.remove(&row.id).unwrap_or_default();
                row.into_estimate(items)
            })
            .collect()
    }

    async fn update_estimate(&self, estimate: &Estimate) -> CoreResult<Estimate> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let version = write_estimate_on(&mut tx, estimate)
            .await?
            .ok_or_else(|| CoreError::stale("Estimate", estimate.id))?;

        sqlx::query("DELETE FROM estimate_items WHERE estimate_id = $1")
            .bind(estimate.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        insert_items_on(&mut tx, estimate).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(with_version(estimate, version))
    }

    async fn delete_estimate(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM estimates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Estimate", id));
        }
        Ok(())
    }

    async fn convert_estimate(&self, estimate: &Estimate, order: &Order) -> CoreResult<Estimate> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The estimate row references the order, so the order goes in first.
        insert_order_on(&mut tx, order).await?;
        let version = write_estimate_on(&mut tx, estimate)
            .await?
            .ok_or_else(|| CoreError::stale("Estimate", estimate.id))?;

        tx.commit().await.map_err(db_err)?;
        Ok(with_version(estimate, version))
    }
}
