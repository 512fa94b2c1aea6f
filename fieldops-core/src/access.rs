//! Role-based access policy.
//!
//! Every externally reachable operation is named here together with the roles
//! allowed to invoke it. The HTTP layer consults the table before a handler
//! runs and the services consult it again, so callers that bypass HTTP get the
//! same answer. Ownership checks ("the owning client", "the assigned
//! technician") need the entity and stay in the services.

use serde::{Deserialize, Serialize};

use crate::identity::{Actor, Role};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateEstimate,
    ViewEstimate,
    ListEstimates,
    UpdateEstimate,
    DeleteEstimate,
    SendEstimate,
    ApproveEstimate,
    RejectEstimate,
    ConvertEstimate,
    CreateOrder,
    ViewOrder,
    ListOrders,
    UpdateOrder,
    AssignTechnician,
    UpdateOrderStatus,
    CancelOrder,
    CreateInvoice,
    ViewInvoice,
    ListInvoices,
    UpdateInvoice,
    InvoiceSummary,
    CapturePayment,
    ViewPayments,
}

const ADMIN: &[Role] = &[Role::Admin];
const ANYONE: &[Role] = &[Role::Admin, Role::Dispatcher, Role::Technician, Role::Client];
const STAFF_QUOTING: &[Role] = &[Role::Technician, Role::Admin];
const CLIENT: &[Role] = &[Role::Client];
const ADMIN_OR_CLIENT: &[Role] = &[Role::Admin, Role::Client];
const FIELD_WORK: &[Role] = &[Role::Admin, Role::Technician];

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        use Operation::*;
        match self {
            CreateEstimate | UpdateEstimate | SendEstimate => STAFF_QUOTING,
            ViewEstimate | ListEstimates => &[Role::Admin, Role::Technician, Role::Client],
            DeleteEstimate | ConvertEstimate => ADMIN,
            ApproveEstimate | RejectEstimate => CLIENT,
            CreateOrder => CLIENT,
            ViewOrder | ListOrders => ANYONE,
            UpdateOrder | UpdateOrderStatus => FIELD_WORK,
            AssignTechnician => ADMIN,
            CancelOrder => CLIENT,
            CreateInvoice | ViewInvoice | ListInvoices => ADMIN_OR_CLIENT,
            UpdateInvoice | InvoiceSummary => ADMIN,
            CapturePayment | ViewPayments => ADMIN_OR_CLIENT,
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}

/// Deny with Forbidden unless the actor's role may perform `op`.
pub fn authorize(actor: &Actor, op: Operation) -> CoreResult<()> {
    if op.allows(actor.role) {
        Ok(())
    } else {
        tracing::debug!(
            "Denied {:?} for user {} with role {}",
            op,
            actor.user_id,
            actor.role
        );
        Err(CoreError::Forbidden(
            "Insufficient permissions to perform this action".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn test_conversion_is_admin_only() {
        assert!(authorize(&actor(Role::Admin), Operation::ConvertEstimate).is_ok());
        for role in [Role::Dispatcher, Role::Technician, Role::Client] {
            assert_eq!(
                authorize(&actor(role), Operation::ConvertEstimate).unwrap_err().kind(),
                "forbidden"
            );
        }
    }

    #[test]
    fn test_estimate_responses_belong_to_clients() {
        assert!(Operation::ApproveEstimate.allows(Role::Client));
        assert!(!Operation::ApproveEstimate.allows(Role::Admin));
        assert!(!Operation::RejectEstimate.allows(Role::Technician));
    }

    #[test]
    fn test_field_work_roles() {
        assert!(Operation::UpdateOrderStatus.allows(Role::Technician));
        assert!(Operation::UpdateOrder.allows(Role::Admin));
        assert!(!Operation::UpdateOrder.allows(Role::Client));
        assert!(!Operation::AssignTechnician.allows(Role::Dispatcher));
    }
}
