//! Execution-state transitions for an [`Order`].
//!
//! ```text
//! pending -> assigned -> in_progress -> completed
//!    \          \             \
//!     +----------+-------------+--> cancelled
//! ```
//!
//! Reassignment while still `assigned` is allowed. `completed` and
//! `cancelled` are terminal. The payment marker is orthogonal and only
//! moves from unpaid to paid.

use chrono::{DateTime, Utc};
use fieldops_core::CoreError;
use uuid::Uuid;

use crate::models::{ExecutionState, Order, PaymentState};

/// Set the technician and move to `assigned`.
pub fn assign(order: &mut Order, technician_id: Uuid) -> Result<(), OrderError> {
    match order.status.execution {
        ExecutionState::Pending | ExecutionState::Assigned => {
            order.technician_id = Some(technician_id);
            order.status.execution = ExecutionState::Assigned;
            order.touch();
            Ok(())
        }
        from => Err(OrderError::invalid(from, ExecutionState::Assigned)),
    }
}

/// `assigned -> in_progress`, stamping the actual start.
pub fn start(order: &mut Order, at: Option<DateTime<Utc>>) -> Result<(), OrderError> {
    if order.status.execution != ExecutionState::Assigned {
        return Err(OrderError::invalid(order.status.execution, ExecutionState::InProgress));
    }
    order.status.execution = ExecutionState::InProgress;
    order.actual_start_time = Some(at.unwrap_or_else(Utc::now));
    order.touch();
    Ok(())
}

/// `in_progress -> completed`, stamping the actual end.
pub fn complete(order: &mut Order, at: Option<DateTime<Utc>>) -> Result<(), OrderError> {
    if order.status.execution != ExecutionState::InProgress {
        return Err(OrderError::invalid(order.status.execution, ExecutionState::Completed));
    }
    order.status.execution = ExecutionState::Completed;
    order.actual_end_time = Some(at.unwrap_or_else(Utc::now));
    order.touch();
    Ok(())
}

pub fn cancel(order: &mut Order) -> Result<(), OrderError> {
    if order.status.execution.is_terminal() {
        return Err(OrderError::invalid(order.status.execution, ExecutionState::Cancelled));
    }
    order.status.execution = ExecutionState::Cancelled;
    order.touch();
    Ok(())
}

/// Apply a requested execution state. Only the forward field transitions
/// are reachable this way; assignment and cancellation have their own paths.
pub fn transition(
    order: &mut Order,
    target: ExecutionState,
    at: Option<DateTime<Utc>>,
) -> Result<(), OrderError> {
    match target {
        ExecutionState::InProgress => start(order, at),
        ExecutionState::Completed => complete(order, at),
        other => Err(OrderError::UnsupportedTarget(other)),
    }
}

/// Idempotent: paying an already paid order is a no-op.
pub fn mark_paid(order: &mut Order) -> bool {
    if order.status.payment == PaymentState::Paid {
        return false;
    }
    order.status.payment = PaymentState::Paid;
    order.touch();
    true
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: ExecutionState, to: ExecutionState },

    #[error("Status '{0}' cannot be set directly; use the dedicated endpoint")]
    UnsupportedTarget(ExecutionState),

    #[error("Unknown order status '{0}'")]
    UnknownStatus(String),
}

impl OrderError {
    fn invalid(from: ExecutionState, to: ExecutionState) -> Self {
        OrderError::InvalidTransition { from, to }
    }
}

impl From<OrderError> for CoreError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { .. } => CoreError::InvalidState(e.to_string()),
            OrderError::UnsupportedTarget(_) | OrderError::UnknownStatus(_) => {
                CoreError::Validation(e.to_string())
            }
        }
    }
}
