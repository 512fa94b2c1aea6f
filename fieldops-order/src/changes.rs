use chrono::{DateTime, Utc};
use fieldops_core::{CoreError, GeoPoint, Role};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::models::{ExecutionState, Order};
use crate::workflow::{self, OrderError};

/// Fields a technician may touch on an order assigned to them.
pub const TECHNICIAN_FIELDS: &[&str] = &["status", "actual_start_time", "actual_end_time"];

/// Partial update of an [`Order`]. Absent keys are left alone; for nullable
/// fields an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub actual_start_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub actual_end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub location: Option<Option<GeoPoint>>,
    #[serde(default, deserialize_with = "double_option")]
    pub preferred_start_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_start_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub estimated_duration_hours: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub materials_cost: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub labor_cost: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub equipment_cost: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub total_cost: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub job_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub technician_id: Option<Option<Uuid>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl OrderPatch {
    /// Names of the fields present in the request.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        macro_rules! touched {
            ($($field:ident),*) => {
                $(if self.$field.is_some() { fields.push(stringify!($field)); })*
            };
        }
        touched!(
            status,
            actual_start_time,
            actual_end_time,
            qualification,
            description,
            address,
            location,
            preferred_start_time,
            scheduled_start_time,
            scheduled_end_time,
            estimated_duration_hours,
            materials_cost,
            labor_cost,
            equipment_cost,
            total_cost,
            notes,
            job_number,
            technician_id
        );
        fields
    }

    fn touches_costs(&self) -> bool {
        self.materials_cost.is_some() || self.labor_cost.is_some() || self.equipment_cost.is_some()
    }
}

/// Execution change caused by a patch, if any.
pub type StatusChange = Option<(ExecutionState, ExecutionState)>;

/// Applies field-restricted patches to orders.
pub struct ChangeHandler;

impl ChangeHandler {
    /// Check field restrictions for `role`, then apply `patch`.
    ///
    /// Cost fields recompute `total_cost` whenever any of them is present.
    /// A status different from the current one goes through the workflow,
    /// using the supplied actual start/end time as the stamp.
    pub fn apply(order: &mut Order, patch: OrderPatch, role: Role) -> Result<StatusChange, ChangeError> {
        Self::check_fields(&patch, role)?;

        if patch.technician_id.is_some() {
            return Err(ChangeError::AssignmentOnly);
        }
        if patch.total_cost.is_some() {
            return Err(ChangeError::DerivedField("total_cost"));
        }

        let target = match patch.status.as_deref() {
            Some(s) => Some(ExecutionState::parse(s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))?),
            None => None,
        };
        if let Some(Some(location)) = &patch.location {
            location
                .validate()
                .map_err(|e| ChangeError::ValidationFailed(e.to_string()))?;
        }

        let recompute = patch.touches_costs();

        if let Some(v) = patch.qualification {
            order.qualification = v;
        }
        if let Some(v) = patch.address {
            order.address = v;
        }
        if let Some(v) = patch.description {
            order.description = v;
        }
        if let Some(v) = patch.location {
            order.location = v;
        }
        if let Some(v) = patch.preferred_start_time {
            order.preferred_start_time = v;
        }
        if let Some(v) = patch.scheduled_start_time {
            order.scheduled_start_time = v;
        }
        if let Some(v) = patch.scheduled_end_time {
            order.scheduled_end_time = v;
        }
        if let Some(v) = patch.estimated_duration_hours {
            order.estimated_duration_hours = v;
        }
        if let Some(v) = patch.notes {
            order.notes = v;
        }
        if let Some(v) = patch.job_number {
            order.job_number = v;
        }
        if let Some(v) = patch.materials_cost {
            order.materials_cost = v;
        }
        if let Some(v) = patch.labor_cost {
            order.labor_cost = v;
        }
        if let Some(v) = patch.equipment_cost {
            order.equipment_cost = v;
        }
        if recompute {
            order
                .recompute_total_cost()
                .map_err(|e| ChangeError::ValidationFailed(e.to_string()))?;
        }

        let start_stamp = patch.actual_start_time.flatten();
        let end_stamp = patch.actual_end_time.flatten();

        let change = match target {
            Some(to) if to != order.status.execution => {
                let from = order.status.execution;
                let stamp = match to {
                    ExecutionState::InProgress => start_stamp,
                    ExecutionState::Completed => end_stamp,
                    _ => None,
                };
                workflow::transition(order, to, stamp)?;
                Some((from, to))
            }
            _ => None,
        };

        // Explicit corrections of the stamps outside a transition.
        let entered = change.map(|(_, to)| to);
        if entered != Some(ExecutionState::InProgress) {
            if let Some(v) = patch.actual_start_time {
                order.actual_start_time = v;
            }
        }
        if entered != Some(ExecutionState::Completed) {
            if let Some(v) = patch.actual_end_time {
                order.actual_end_time = v;
            }
        }

        order.touch();
        Ok(change)
    }

    fn check_fields(patch: &OrderPatch, role: Role) -> Result<(), ChangeError> {
        if role != Role::Technician {
            return Ok(());
        }
        match patch
            .touched_fields()
            .into_iter()
            .find(|f| !TECHNICIAN_FIELDS.contains(f))
        {
            Some(field) => Err(ChangeError::FieldNotAllowed(field)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("Technician cannot update the field '{0}'")]
    FieldNotAllowed(&'static str),

    #[error("Technician can only be changed through assignment")]
    AssignmentOnly,

    #[error("'{0}' is derived and cannot be set directly")]
    DerivedField(&'static str),

    #[error("Change validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Workflow(#[from] OrderError),
}

impl From<ChangeError> for CoreError {
    fn from(e: ChangeError) -> Self {
        match e {
            ChangeError::FieldNotAllowed(_) => CoreError::Forbidden(e.to_string()),
            ChangeError::AssignmentOnly
            | ChangeError::DerivedField(_)
            | ChangeError::ValidationFailed(_) => CoreError::Validation(e.to_string()),
            ChangeError::Workflow(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: serde_json::Value) -> OrderPatch {
        serde_json::from_value(value).unwrap()
    }

    fn assigned_order() -> Order {
        let mut order = Order::new(Uuid::new_v4(), "hvac", "1 Main St");
        workflow::assign(&mut order, Uuid::new_v4()).unwrap();
        order
    }

    #[test]
    fn test_technician_restricted_to_status_fields() {
        let mut order = assigned_order();
        let err = ChangeHandler::apply(&mut order, patch(json!({"notes": "gate code 1234"})), Role::Technician)
            .unwrap_err();
        assert!(matches!(err, ChangeError::FieldNotAllowed("notes")));
        assert_eq!(CoreError::from(err).kind(), "forbidden");
        assert!(order.notes.is_none());

        let err = ChangeHandler::apply(
            &mut order,
            patch(json!({"status": "in_progress", "labor_cost": "10"})),
            Role::Technician,
        )
        .unwrap_err();
        assert!(matches!(err, ChangeError::FieldNotAllowed("labor_cost")));
        assert_eq!(order.status.execution, ExecutionState::Assigned);
    }

    #[test]
    fn test_technician_starts_with_own_timestamp() {
        let mut order = assigned_order();
        let started = "2026-03-01T08:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let change = ChangeHandler::apply(
            &mut order,
            patch(json!({"status": "in_progress", "actual_start_time": started})),
            Role::Technician,
        )
        .unwrap();

        assert_eq!(change, Some((ExecutionState::Assigned, ExecutionState::InProgress)));
        assert_eq!(order.actual_start_time, Some(started));
    }

    #[test]
    fn test_cost_update_recomputes_total() {
        let mut order = assigned_order();
        ChangeHandler::apply(
            &mut order,
            patch(json!({"materials_cost": "100.50", "labor_cost": "80"})),
            Role::Admin,
        )
        .unwrap();
        assert_eq!(order.total_cost, Some(Decimal::new(18050, 2)));

        ChangeHandler::apply(&mut order, patch(json!({"materials_cost": null})), Role::Admin).unwrap();
        assert_eq!(order.total_cost, Some(Decimal::new(8000, 2)));
    }

    #[test]
    fn test_technician_reference_only_through_assignment() {
        let mut order = assigned_order();
        let err = ChangeHandler::apply(
            &mut order,
            patch(json!({"technician_id": Uuid::new_v4()})),
            Role::Admin,
        )
        .unwrap_err();
        assert_eq!(CoreError::from(err).kind(), "validation_error");
    }

    #[test]
    fn test_terminal_status_cannot_be_left() {
        let mut order = assigned_order();
        workflow::cancel(&mut order).unwrap();
        let err = ChangeHandler::apply(&mut order, patch(json!({"status": "in_progress"})), Role::Admin)
            .unwrap_err();
        assert_eq!(CoreError::from(err).kind(), "invalid_state");
        assert_eq!(order.status.execution, ExecutionState::Cancelled);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut order = assigned_order();
        let err = ChangeHandler::apply(&mut order, patch(json!({"status": "paid"})), Role::Admin).unwrap_err();
        assert_eq!(CoreError::from(err).kind(), "validation_error");
    }

    #[test]
    fn test_same_status_keeps_order_state() {
        let mut order = assigned_order();
        let change = ChangeHandler::apply(
            &mut order,
            patch(json!({"status": "assigned", "notes": "ring twice"})),
            Role::Admin,
        )
        .unwrap();
        assert!(change.is_none());
        assert_eq!(order.notes.as_deref(), Some("ring twice"));
    }
}
