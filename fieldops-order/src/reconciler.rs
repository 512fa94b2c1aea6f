use chrono::Utc;
use fieldops_core::access::{authorize, Operation};
use fieldops_core::payment::CaptureRequest;
use fieldops_core::{Actor, CoreError, CoreResult, GatewayEvent, Notifier, PaymentGateway, PaymentMethod};
use fieldops_shared::models::events::PaymentReconciledEvent;
use fieldops_shared::DomainEvent;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Order;
use crate::payment::{Payment, PaymentRecord};
use crate::repository::{OrderRepository, PaymentRepository};
use crate::service::ensure_order_owner;

#[derive(Debug, Clone)]
pub enum Reconciliation {
    Recorded(Payment),
    /// The transaction id was already on file; nothing was changed.
    Duplicate { transaction_id: String },
    /// The event names an order this engine does not know; nothing was written.
    UnknownOrder { order_id: Uuid },
}

impl Reconciliation {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Reconciliation::Duplicate { .. })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureInput {
    pub order_id: Uuid,
    /// Gateway handle of the authorized charge.
    pub reference: String,
    /// Defaults to the order total.
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Turns gateway charge results into Payments and paid markers.
pub struct PaymentReconciler {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentReconciler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            payments,
            gateway,
            notifier,
        }
    }

    /// Record one delivered gateway event.
    ///
    /// Duplicates are detected by the store's uniqueness guard on the
    /// transaction id, so concurrent deliveries of the same event still
    /// produce a single Payment. Events for unknown orders are acknowledged
    /// without writing anything so the gateway stops redelivering them.
    pub async fn reconcile(&self, event: GatewayEvent) -> CoreResult<Reconciliation> {
        if event.transaction_id.trim().is_empty() {
            return Err(CoreError::Validation("Gateway event has no transaction id".to_string()));
        }

        let Some(order) = self.orders.get_order(event.order_id).await? else {
            tracing::warn!(
                "{} transaction {} references unknown order {}; acknowledging without recording",
                event.method,
                event.transaction_id,
                event.order_id
            );
            return Ok(Reconciliation::UnknownOrder {
                order_id: event.order_id,
            });
        };
        let client_id = event.client_id.unwrap_or(order.client_id);
        let payment = Payment::from_event(event, client_id);

        match self.payments.record_payment(&payment).await? {
            PaymentRecord::Duplicate => {
                tracing::warn!(
                    "Duplicate {} delivery for transaction {}; ignoring",
                    payment.method,
                    payment.transaction_id
                );
                Ok(Reconciliation::Duplicate {
                    transaction_id: payment.transaction_id,
                })
            }
            PaymentRecord::Inserted => {
                tracing::info!(
                    "Recorded {} payment {} for order {} ({}, {})",
                    payment.method,
                    payment.transaction_id,
                    payment.order_id,
                    payment.amount,
                    payment.status.as_str()
                );
                self.notifier
                    .notify(&DomainEvent::PaymentReconciled(PaymentReconciledEvent {
                        payment_id: payment.id,
                        order_id: payment.order_id,
                        client_id: payment.client_id,
                        amount: payment.amount,
                        method: payment.method.to_string(),
                        transaction_id: payment.transaction_id.clone(),
                        successful: payment.is_successful(),
                        timestamp: Utc::now().timestamp(),
                    }))
                    .await;
                Ok(Reconciliation::Recorded(payment))
            }
        }
    }

    /// Client-initiated capture: ask the gateway to capture the charge, then
    /// reconcile the result exactly like a webhook delivery.
    pub async fn capture(
        &self,
        actor: &Actor,
        method: PaymentMethod,
        input: CaptureInput,
    ) -> CoreResult<Reconciliation> {
        authorize(actor, Operation::CapturePayment)?;
        let order = self.load_order(input.order_id).await?;
        ensure_order_owner(actor, &order)?;

        let amount = match input.amount {
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(CoreError::Validation("Amount must be positive".to_string()))
            }
            Some(amount) => amount,
            None => order_amount(&order)?,
        };

        let request = CaptureRequest {
            method,
            order_id: order.id,
            client_id: order.client_id,
            reference: input.reference,
            amount,
        };
        let event = self.gateway.capture(&request).await?;
        self.reconcile(event).await
    }

    pub async fn get_payment(&self, actor: &Actor, id: Uuid) -> CoreResult<Payment> {
        authorize(actor, Operation::ViewPayments)?;
        let payment = self
            .payments
            .get_payment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", id))?;
        if !actor.is_admin() && payment.client_id != actor.user_id {
            return Err(CoreError::Forbidden(
                "You do not have access to this payment".to_string(),
            ));
        }
        Ok(payment)
    }

    pub async fn list_for_order(&self, actor: &Actor, order_id: Uuid) -> CoreResult<Vec<Payment>> {
        authorize(actor, Operation::ViewPayments)?;
        let order = self.load_order(order_id).await?;
        ensure_order_owner(actor, &order)?;
        self.payments.list_payments_for_order(order_id).await
    }

    async fn load_order(&self, id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", id))
    }
}

fn order_amount(order: &Order) -> CoreResult<Decimal> {
    let amount = match order.total_cost {
        Some(total) => total,
        None => order.items_total()?,
    };
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "Order {} has no amount to capture; specify one",
            order.id
        )));
    }
    Ok(amount)
}
