use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldops_core::{CoreError, CoreResult, PaymentMethod};
use fieldops_order::{
    Invoice, InvoiceItem, InvoiceRepository, InvoiceStatus, Payment, PaymentRecord, PaymentRepository,
    PaymentStatus,
};
use fieldops_shared::Masked;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{corrupt, db_err};
use crate::order_repo::mark_order_paid_on;

/// Invoices and payments share a repository: recording a successful payment
/// settles invoices in the same transaction.
pub struct StoreBillingRepository {
    pool: PgPool,
}

impl StoreBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    order_id: Uuid,
    client_id: Uuid,
    amount: Decimal,
    tax: Decimal,
    discount: Decimal,
    due_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct InvoiceItemRow {
    id: Uuid,
    invoice_id: Uuid,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    total: Decimal,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    client_id: Uuid,
    amount: Decimal,
    method: String,
    transaction_id: String,
    status: String,
    raw_payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

const INVOICE_COLUMNS: &str =
    "id, order_id, client_id, amount, tax, discount, due_date, notes, status, version, created_at";

const PAYMENT_COLUMNS: &str =
    "id, order_id, client_id, amount, method, transaction_id, status, raw_payload, created_at";

impl InvoiceRow {
    fn into_invoice(self, rows: Vec<InvoiceItemRow>) -> CoreResult<Invoice> {
        let status = InvoiceStatus::parse(&self.status)
            .ok_or_else(|| corrupt("invoices.status", &self.status))?;
        let items = rows
            .into_iter()
            .map(|r| InvoiceItem {
                id: r.id,
                invoice_id: r.invoice_id,
                description: r.description,
                quantity: r.quantity,
                unit_price: r.unit_price,
                total: r.total,
            })
            .collect();

        Ok(Invoice {
            id: self.id,
            order_id: self.order_id,
            client_id: self.client_id,
            amount: self.amount,
            tax: self.tax,
            discount: self.discount,
            due_date: self.due_date,
            notes: self.notes,
            status,
            items,
            version: self.version,
            created_at: self.created_at,
        })
    }
}

impl PaymentRow {
    fn into_payment(self) -> CoreResult<Payment> {
        let method: PaymentMethod = self
            .method
            .parse()
            .map_err(|_| corrupt("payments.method", &self.method))?;
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| corrupt("payments.status", &self.status))?;

        Ok(Payment {
            id: self.id,
            order_id: self.order_id,
            client_id: self.client_id,
            amount: self.amount,
            method,
            transaction_id: self.transaction_id,
            status,
            raw_payload: Masked::new(self.raw_payload),
            created_at: self.created_at,
        })
    }
}

async fn insert_invoice_items_on(conn: &mut PgConnection, invoice: &Invoice) -> CoreResult<()> {
    for (position, item) in invoice.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (id, invoice_id, description, quantity, unit_price, total, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(invoice.id)
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

async fn load_invoice_items(pool: &PgPool, ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<InvoiceItemRow>>> {
    let rows = sqlx::query_as::<_, InvoiceItemRow>(
        r#"
        SELECT id, invoice_id, description, quantity, unit_price, total
        FROM invoice_items WHERE invoice_id = ANY($1) ORDER BY invoice_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let mut grouped: HashMap<Uuid, Vec<InvoiceItemRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.invoice_id).or_default().push(row);
    }
    Ok(grouped)
}

#[async_trait]
impl InvoiceRepository for StoreBillingRepository {
    async fn insert_invoice(&self, invoice: &Invoice) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, order_id, client_id, amount, tax, discount, due_date, notes, status, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.order_id)
        .bind(invoice.client_id)
        .bind(invoice.amount)
        .bind(invoice.tax)
        .bind(invoice.discount)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(invoice.status.as_str())
        .bind(invoice.version)
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_invoice_items_on(&mut tx, invoice).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let mut items = load_invoice_items(&self.pool, &[id]).await?;
                Ok(Some(row.into_invoice(items.remove(&id).unwrap_or_default())?))
            }
            None => Ok(None),
        }
    }

    async fn list_invoices(&self, client_id: Option<Uuid>) -> CoreResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE ($1::uuid IS NULL OR client_id = $1) ORDER BY created_at DESC",
            INVOICE_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_invoice_items(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_invoice(lines)
            })
            .collect()
    }

    async fn update_invoice(&self, invoice: &Invoice) -> CoreResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE invoices SET
                amount = $3, tax = $4, discount = $5, due_date = $6, notes = $7, status = $8,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.version)
        .bind(invoice.amount)
        .bind(invoice.tax)
        .bind(invoice.discount)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(invoice.status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let version = version.ok_or_else(|| CoreError::stale("Invoice", invoice.id))?;

        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        insert_invoice_items_on(&mut tx, invoice).await?;

        tx.commit().await.map_err(db_err)?;

        let mut saved = invoice.clone();
        saved.version = version;
        Ok(saved)
    }
}

#[async_trait]
impl PaymentRepository for StoreBillingRepository {
    async fn record_payment(&self, payment: &Payment) -> CoreResult<PaymentRecord> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO payments (id, order_id, client_id, amount, method, transaction_id, status, raw_payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.client_id)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(&payment.transaction_id)
        .bind(payment.status.as_str())
        .bind(payment.raw_payload.expose())
        .bind(payment.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if inserted.is_none() {
            tx.rollback().await.map_err(db_err)?;
            return Ok(PaymentRecord::Duplicate);
        }

        if payment.is_successful() {
            mark_order_paid_on(&mut tx, payment.order_id).await?;
            sqlx::query(
                r#"
                UPDATE invoices SET status = 'paid', version = version + 1
                WHERE order_id = $1 AND status <> 'paid'
                "#,
            )
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(PaymentRecord::Inserted)
    }

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn list_payments_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }
}
