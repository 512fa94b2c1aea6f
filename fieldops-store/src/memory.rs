use async_trait::async_trait;
use fieldops_catalog::{CatalogEntry, CatalogRepository, ItemType, Technician, TechnicianRepository};
use fieldops_core::{CoreError, CoreResult, Role, UserDirectory, UserRecord};
use fieldops_estimate::{Estimate, EstimateRepository, EstimateScope};
use fieldops_order::{
    Invoice, InvoiceRepository, InvoiceStatus, Order, OrderFilter, OrderRepository, Payment, PaymentRecord,
    PaymentRepository, PaymentState,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    technicians: HashMap<Uuid, Technician>,
    catalog: HashMap<Uuid, CatalogEntry>,
    orders: HashMap<Uuid, Order>,
    estimates: HashMap<Uuid, Estimate>,
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
    /// transaction id -> payment id
    transactions: HashMap<String, Uuid>,
}

/// Process-local store implementing every repository. One lock guards all
/// tables, so each call is atomic the way a database transaction would be.
/// Used when no database URL is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: UserRecord) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Register a technician account together with its dispatch profile.
    pub async fn add_technician(&self, technician: Technician) {
        let mut state = self.state.write().await;
        state.users.insert(
            technician.id,
            UserRecord {
                id: technician.id,
                name: technician.name.clone(),
                email: None,
                role: Role::Technician,
            },
        );
        state.technicians.insert(technician.id, technician);
    }

    pub async fn add_catalog_entry(&self, entry: CatalogEntry) {
        self.state.write().await.catalog.insert(entry.id, entry);
    }
}

fn newest_first<T>(mut rows: Vec<T>, created: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    rows.sort_by_key(|r| std::cmp::Reverse(created(r)));
    rows
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: Uuid) -> CoreResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl TechnicianRepository for MemoryStore {
    async fn candidates(&self, qualification: &str) -> CoreResult<Vec<Technician>> {
        let state = self.state.read().await;
        Ok(state
            .technicians
            .values()
            .filter(|t| t.qualification == qualification)
            .filter(|t| state.users.get(&t.id).is_some_and(|u| u.role == Role::Technician))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn find_entry(&self, item_type: ItemType, id: Uuid) -> CoreResult<Option<CatalogEntry>> {
        Ok(self
            .state
            .read()
            .await
            .catalog
            .get(&id)
            .filter(|e| e.item_type == item_type)
            .cloned())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("Order {} already exists", order.id)));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let rows = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        Ok(newest_first(rows, |o: &Order| o.created_at))
    }

    async fn update_order(&self, order: &Order) -> CoreResult<Order> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.id)
            .filter(|o| o.version == order.version)
            .ok_or_else(|| CoreError::stale("Order", order.id))?;

        let mut saved = order.clone();
        saved.version += 1;
        // Items are fixed at insert time.
        saved.items = stored.items.clone();
        *stored = saved.clone();
        Ok(saved)
    }
}

#[async_trait]
impl EstimateRepository for MemoryStore {
    async fn insert_estimate(&self, estimate: &Estimate) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.estimates.contains_key(&estimate.id) {
            return Err(CoreError::Conflict(format!("Estimate {} already exists", estimate.id)));
        }
        state.estimates.insert(estimate.id, estimate.clone());
        Ok(())
    }

    async fn get_estimate(&self, id: Uuid) -> CoreResult<Option<Estimate>> {
        Ok(self.state.read().await.estimates.get(&id).cloned())
    }

    async fn list_estimates(&self, scope: &EstimateScope) -> CoreResult<Vec<Estimate>> {
        let state = self.state.read().await;
        let rows = state.estimates.values().filter(|e| scope.matches(e)).cloned().collect();
        Ok(newest_first(rows, |e: &Estimate| e.created_at))
    }

    async fn update_estimate(&self, estimate: &Estimate) -> CoreResult<Estimate> {
        let mut state = self.state.write().await;
        let stored = state
            .estimates
            .get_mut(&estimate.id)
            .filter(|e| e.version == estimate.version)
            .ok_or_else(|| CoreError::stale("Estimate", estimate.id))?;

        let mut saved = estimate.clone();
        saved.version += 1;
        *stored = saved.clone();
        Ok(saved)
    }

    async fn delete_estimate(&self, id: Uuid) -> CoreResult<()> {
        self.state
            .write()
            .await
            .estimates
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("Estimate", id))
    }

    async fn convert_estimate(&self, estimate: &Estimate, order: &Order) -> CoreResult<Estimate> {
        let mut state = self.state.write().await;

        let current = state
            .estimates
            .get(&estimate.id)
            .filter(|e| e.version == estimate.version)
            .ok_or_else(|| CoreError::stale("Estimate", estimate.id))?;
        if current.converted_order_id.is_some() || state.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!(
                "Estimate {} has already been converted",
                estimate.id
            )));
        }

        let mut saved = estimate.clone();
        saved.version += 1;
        state.orders.insert(order.id, order.clone());
        state.estimates.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn insert_invoice(&self, invoice: &Invoice) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&invoice.order_id) {
            return Err(CoreError::Validation(format!(
                "Order {} does not exist",
                invoice.order_id
            )));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(&id).cloned())
    }

    async fn list_invoices(&self, client_id: Option<Uuid>) -> CoreResult<Vec<Invoice>> {
        let state = self.state.read().await;
        let rows = state
            .invoices
            .values()
            .filter(|i| client_id.map_or(true, |c| i.client_id == c))
            .cloned()
            .collect();
        Ok(newest_first(rows, |i: &Invoice| i.created_at))
    }

    async fn update_invoice(&self, invoice: &Invoice) -> CoreResult<Invoice> {
        let mut state = self.state.write().await;
        let stored = state
            .invoices
            .get_mut(&invoice.id)
            .filter(|i| i.version == invoice.version)
            .ok_or_else(|| CoreError::stale("Invoice", invoice.id))?;

        let mut saved = invoice.clone();
        saved.version += 1;
        *stored = saved.clone();
        Ok(saved)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn record_payment(&self, payment: &Payment) -> CoreResult<PaymentRecord> {
        let mut state = self.state.write().await;

        if state.transactions.contains_key(&payment.transaction_id) {
            return Ok(PaymentRecord::Duplicate);
        }
        if !state.orders.contains_key(&payment.order_id) {
            return Err(CoreError::Validation(format!(
                "Order {} does not exist",
                payment.order_id
            )));
        }

        state
            .transactions
            .insert(payment.transaction_id.clone(), payment.id);
        state.payments.insert(payment.id, payment.clone());

        if payment.is_successful() {
            if let Some(order) = state.orders.get_mut(&payment.order_id) {
                if order.status.payment != PaymentState::Paid {
                    order.status.payment = PaymentState::Paid;
                    order.version += 1;
                    order.touch();
                }
            }
            for invoice in state
                .invoices
                .values_mut()
                .filter(|i| i.order_id == payment.order_id && i.status != InvoiceStatus::Paid)
            {
                invoice.status = InvoiceStatus::Paid;
                invoice.version += 1;
            }
        }
        Ok(PaymentRecord::Inserted)
    }

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn list_payments_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Payment>> {
        let state = self.state.read().await;
        let mut rows: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }
}
