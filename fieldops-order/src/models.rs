use chrono::{DateTime, Utc};
use fieldops_catalog::{ItemType, PricedLine};
use fieldops_core::money::checked_sum;
use fieldops_core::{CoreResult, GeoPoint};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where the job is in the field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Assigned => "assigned",
            ExecutionState::InProgress => "in_progress",
            ExecutionState::Completed => "completed",
            ExecutionState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionState::Pending),
            "assigned" => Some(ExecutionState::Assigned),
            "in_progress" => Some(ExecutionState::InProgress),
            "completed" => Some(ExecutionState::Completed),
            "cancelled" => Some(ExecutionState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Cancelled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment marker, set only by reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Paid,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Unpaid => "unpaid",
            PaymentState::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentState::Unpaid),
            "paid" => Some(PaymentState::Paid),
            _ => None,
        }
    }
}

/// Execution and payment progress are independent: a job can be paid up
/// front or after completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStatus {
    pub execution: ExecutionState,
    pub payment: PaymentState,
}

impl OrderStatus {
    pub fn new() -> Self {
        Self {
            execution: ExecutionState::Pending,
            payment: PaymentState::Unpaid,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment == PaymentState::Paid
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// A field-service job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    /// Qualification tag a technician needs to take the job.
    pub qualification: String,
    pub description: Option<String>,
    pub address: String,
    pub location: Option<GeoPoint>,
    pub preferred_start_time: Option<DateTime<Utc>>,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub estimated_duration_hours: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub labor_cost: Option<Decimal>,
    pub equipment_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub job_number: Option<String>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(client_id: Uuid, qualification: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            technician_id: None,
            qualification: qualification.into(),
            description: None,
            address: address.into(),
            location: None,
            preferred_start_time: None,
            scheduled_start_time: None,
            scheduled_end_time: None,
            actual_start_time: None,
            actual_end_time: None,
            estimated_duration_hours: None,
            materials_cost: None,
            labor_cost: None,
            equipment_cost: None,
            total_cost: None,
            notes: None,
            job_number: None,
            items: Vec::new(),
            status: OrderStatus::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn execution(&self) -> ExecutionState {
        self.status.execution
    }

    pub fn add_line(&mut self, line: PricedLine) {
        self.items.push(OrderItem::from_line(self.id, line));
        self.updated_at = Utc::now();
    }

    /// total_cost = materials + labor + equipment, missing parts count as zero.
    pub fn recompute_total_cost(&mut self) -> CoreResult<()> {
        let parts = [self.materials_cost, self.labor_cost, self.equipment_cost];
        self.total_cost = Some(checked_sum(parts.iter().map(|c| c.unwrap_or(Decimal::ZERO)))?);
        Ok(())
    }

    pub fn items_total(&self) -> CoreResult<Decimal> {
        checked_sum(self.items.iter().map(|i| i.total))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl OrderItem {
    pub fn from_line(order_id: Uuid, line: PricedLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            item_type: line.item_type,
            item_id: line.item_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total: line.total,
        }
    }
}

/// Filter for role-scoped order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub client_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub execution: Option<ExecutionState>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.client_id.map_or(true, |c| order.client_id == c)
            && self.technician_id.map_or(true, |t| order.technician_id == Some(t))
            && self.execution.map_or(true, |s| order.status.execution == s)
    }
}
