use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct EstimateEvent {
    pub estimate_id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub total: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderAssignedEvent {
    pub order_id: Uuid,
    pub technician_id: Uuid,
    /// `true` when the technician was chosen by the matcher rather than an operator.
    pub matched: bool,
    pub distance_km: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderStatusChangedEvent {
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentReconciledEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub transaction_id: String,
    pub successful: bool,
    pub timestamp: i64,
}

/// Everything the core hands to the notification collaborator.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    EstimateSent(EstimateEvent),
    EstimateApproved(EstimateEvent),
    EstimateRejected(EstimateEvent),
    OrderAssigned(OrderAssignedEvent),
    OrderStatusChanged(OrderStatusChangedEvent),
    OrderCancelled(OrderStatusChangedEvent),
    PaymentReconciled(PaymentReconciledEvent),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::EstimateSent(_) => "estimate_sent",
            DomainEvent::EstimateApproved(_) => "estimate_approved",
            DomainEvent::EstimateRejected(_) => "estimate_rejected",
            DomainEvent::OrderAssigned(_) => "order_assigned",
            DomainEvent::OrderStatusChanged(_) => "order_status_changed",
            DomainEvent::OrderCancelled(_) => "order_cancelled",
            DomainEvent::PaymentReconciled(_) => "payment_reconciled",
        }
    }
}
