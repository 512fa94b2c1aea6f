use chrono::{DateTime, Utc};
use fieldops_core::{GatewayEvent, GatewayOutcome, PaymentMethod};
use fieldops_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "successful" => Some(PaymentStatus::Successful),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// A recorded gateway charge. `transaction_id` is unique across all
/// payments; a second delivery of the same charge is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub raw_payload: Masked<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_event(event: GatewayEvent, client_id: Uuid) -> Self {
        let status = match event.outcome {
            GatewayOutcome::Completed => PaymentStatus::Successful,
            GatewayOutcome::Failed => PaymentStatus::Failed,
        };
        Self {
            id: Uuid::new_v4(),
            order_id: event.order_id,
            client_id,
            amount: event.amount,
            method: event.method,
            transaction_id: event.transaction_id,
            status,
            raw_payload: Masked::new(event.payload),
            created_at: Utc::now(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Successful
    }
}

/// Result of handing a payment to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRecord {
    Inserted,
    /// Another payment already holds this transaction id; nothing changed.
    Duplicate,
}
