use async_trait::async_trait;
use fieldops_core::CoreResult;
use uuid::Uuid;

use crate::invoice::Invoice;
use crate::models::{Order, OrderFilter};
use crate::payment::{Payment, PaymentRecord};

/// Order-with-items persistence. Updates are guarded by `Order::version`:
/// the stored row must still carry the version the caller loaded, otherwise
/// the write is refused with `CoreError::Conflict`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: &Order) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<Order>>;

    /// Write the order's scalar fields and status. Items are immutable once
    /// inserted. Returns the order with its bumped version.
    async fn update_order(&self, order: &Order) -> CoreResult<Order>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn insert_invoice(&self, invoice: &Invoice) -> CoreResult<()>;

    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>>;

    /// All invoices, or only those billed to `client_id`.
    async fn list_invoices(&self, client_id: Option<Uuid>) -> CoreResult<Vec<Invoice>>;

    /// Version-guarded like orders; replaces the items as well.
    async fn update_invoice(&self, invoice: &Invoice) -> CoreResult<Invoice>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Store a payment keyed by its transaction id, in one transaction:
    /// the insert is skipped if the transaction id already exists, and a
    /// newly stored successful payment marks its order and every invoice
    /// of that order paid.
    async fn record_payment(&self, payment: &Payment) -> CoreResult<PaymentRecord>;

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>>;

    async fn list_payments_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Payment>>;
}
