use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldops_catalog::ItemType;
use fieldops_core::{CoreError, CoreResult, GeoPoint};
use fieldops_order::{
    ExecutionState, Order, OrderFilter, OrderItem, OrderRepository, OrderStatus, PaymentState,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{corrupt, db_err};

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    client_id: Uuid,
    technician_id: Option<Uuid>,
    qualification: String,
    description: Option<String>,
    address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    preferred_start_time: Option<DateTime<Utc>>,
    scheduled_start_time: Option<DateTime<Utc>>,
    scheduled_end_time: Option<DateTime<Utc>>,
    actual_start_time: Option<DateTime<Utc>>,
    actual_end_time: Option<DateTime<Utc>>,
    estimated_duration_hours: Option<Decimal>,
    materials_cost: Option<Decimal>,
    labor_cost: Option<Decimal>,
    equipment_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    notes: Option<String>,
    job_number: Option<String>,
    execution_status: String,
    payment_status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LineRow {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub item_type: String,
    pub item_id: Uuid,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl LineRow {
    pub(crate) fn item_type(&self) -> CoreResult<ItemType> {
        self.item_type
            .parse::<ItemType>()
            .map_err(|_| corrupt("item_type", &self.item_type))
    }
}

const ORDER_COLUMNS: &str = "id, client_id, technician_id, qualification, description, address, latitude, longitude, \
     preferred_start_time, scheduled_start_time, scheduled_end_time, actual_start_time, actual_end_time, \
     estimated_duration_hours, materials_cost, labor_cost, equipment_cost, total_cost, notes, job_number, \
     execution_status, payment_status, version, created_at, updated_at";

impl OrderRow {
    fn into_order(self, lines: Vec<LineRow>) -> CoreResult<Order> {
        let execution = ExecutionState::parse(&self.execution_status)
            .ok_or_else(|| corrupt("orders.execution_status", &self.execution_status))?;
        let payment = PaymentState::parse(&self.payment_status)
            .ok_or_else(|| corrupt("orders.payment_status", &self.payment_status))?;

        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };

        let items = lines
            .into_iter()
            .map(|line| {
                Ok(OrderItem {
                    item_type: line.item_type()?,
                    id: line.id,
                    order_id: line.parent_id,
                    item_id: line.item_id,
                    description: line.description,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    total: line.total,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Order {
            id: self.id,
            client_id: self.client_id,
            technician_id: self.technician_id,
            qualification: self.qualification,
            description: self.description,
            address: self.address,
            location,
            preferred_start_time: self.preferred_start_time,
            scheduled_start_time: self.scheduled_start_time,
            scheduled_end_time: self.scheduled_end_time,
            actual_start_time: self.actual_start_time,
            actual_end_time: self.actual_end_time,
            estimated_duration_hours: self.estimated_duration_hours,
            materials_cost: self.materials_cost,
            labor_cost: self.labor_cost,
            equipment_cost: self.equipment_cost,
            total_cost: self.total_cost,
            notes: self.notes,
            job_number: self.job_number,
            items,
            status: OrderStatus { execution, payment },
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Insert an order and its items on an open connection or transaction.
pub(crate) async fn insert_order_on(conn: &mut PgConnection, order: &Order) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, client_id, technician_id, qualification, description, address, latitude, longitude,
            preferred_start_time, scheduled_start_time, scheduled_end_time, actual_start_time, actual_end_time,
            estimated_duration_hours, materials_cost, labor_cost, equipment_cost, total_cost, notes, job_number,
            execution_status, payment_status, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
            $21, $22, $23, $24, $25)
        "#,
    )
    .bind(order.id)
    .bind(order.client_id)
    .bind(order.technician_id)
    .bind(&order.qualification)
    .bind(&order.description)
    .bind(&order.address)
    .bind(order.location.map(|l| l.latitude))
    .bind(order.location.map(|l| l.longitude))
    .bind(order.preferred_start_time)
    .bind(order.scheduled_start_time)
    .bind(order.scheduled_end_time)
    .bind(order.actual_start_time)
    .bind(order.actual_end_time)
    .bind(order.estimated_duration_hours)
    .bind(order.materials_cost)
    .bind(order.labor_cost)
    .bind(order.equipment_cost)
    .bind(order.total_cost)
    .bind(&order.notes)
    .bind(&order.job_number)
    .bind(order.status.execution.as_str())
    .bind(order.status.payment.as_str())
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, item_type, item_id, description, quantity, unit_price, total, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(order.id)
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

/// Set the paid marker on an order, bumping its version.
pub(crate) async fn mark_order_paid_on(conn: &mut PgConnection, order_id: Uuid) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE orders SET payment_status = 'paid', version = version + 1, updated_at = NOW()
        WHERE id = $1 AND payment_status <> 'paid'
        "#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn load_lines(pool: &PgPool, order_ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<LineRow>>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT id, order_id AS parent_id, item_type, item_id, description, quantity, unit_price, total
        FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position
        "#,
    )
    .bind(order_ids)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let mut grouped: HashMap<Uuid, Vec<LineRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.parent_id).or_default().push(row);
    }
    Ok(grouped)
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        insert_order_on(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let mut lines = load_lines(&self.pool, &[id]).await?;
                Ok(Some(row.into_order(lines.remove(&id).unwrap_or_default())?))
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM orders
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR technician_id = $2)
              AND ($3::text IS NULL OR execution_status = $3)
            ORDER BY created_at DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(filter.client_id)
        .bind(filter.technician_id)
        .bind(filter.execution.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines = load_lines(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let items = lines.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    async fn update_order(&self, order: &Order) -> CoreResult<Order> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders SET
                technician_id = $3, qualification = $4, description = $5, address = $6, latitude = $7, longitude = $8,
                preferred_start_time = $9, scheduled_start_time = $10, scheduled_end_time = $11,
                actual_start_time = $12, actual_end_time = $13, estimated_duration_hours = $14,
                materials_cost = $15, labor_cost = $16, equipment_cost = $17, total_cost = $18,
                notes = $19, job_number = $20, execution_status = $21, payment_status = $22,
                updated_at = $23, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.technician_id)
        .bind(&order.qualification)
        .bind(&order.description)
        .bind(&order.address)
        .bind(order.location.map(|l| l.latitude))
        .bind(order.location.map(|l| l.longitude))
        .bind(order.preferred_start_time)
        .bind(order.scheduled_start_time)
        .bind(order.scheduled_end_time)
        .bind(order.actual_start_time)
        .bind(order.actual_end_time)
        .bind(order.estimated_duration_hours)
        .bind(order.materials_cost)
        .bind(order.labor_cost)
        .bind(order.equipment_cost)
        .bind(order.total_cost)
        .bind(&order.notes)
        .bind(&order.job_number)
        .bind(order.status.execution.as_str())
        .bind(order.status.payment.as_str())
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match version {
            Some(version) => {
                let mut saved = order.clone();
                saved.version = version;
                Ok(saved)
            }
            None => Err(CoreError::stale("Order", order.id)),
        }
    }
}
