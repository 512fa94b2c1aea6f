use fieldops_core::CoreError;

use crate::models::{Estimate, EstimateStatus};

/// draft -> sent
pub fn send(estimate: &mut Estimate) -> Result<(), EstimateError> {
    move_to(estimate, EstimateStatus::Draft, EstimateStatus::Sent)
}

/// sent -> approved
pub fn approve(estimate: &mut Estimate) -> Result<(), EstimateError> {
    move_to(estimate, EstimateStatus::Sent, EstimateStatus::Approved)
}

/// sent -> rejected
pub fn reject(estimate: &mut Estimate) -> Result<(), EstimateError> {
    move_to(estimate, EstimateStatus::Sent, EstimateStatus::Rejected)
}

fn move_to(estimate: &mut Estimate, from: EstimateStatus, to: EstimateStatus) -> Result<(), EstimateError> {
    if estimate.status != from {
        return Err(EstimateError::InvalidTransition {
            from: estimate.status,
            to,
        });
    }
    estimate.status = to;
    estimate.touch();
    Ok(())
}

/// Content changes are only accepted while the estimate is a draft.
pub fn ensure_editable(estimate: &Estimate) -> Result<(), EstimateError> {
    if estimate.status != EstimateStatus::Draft {
        return Err(EstimateError::NotEditable(estimate.status));
    }
    Ok(())
}

/// Approved and not yet turned into an order.
pub fn ensure_convertible(estimate: &Estimate) -> Result<(), EstimateError> {
    if let Some(order_id) = estimate.converted_order_id {
        return Err(EstimateError::AlreadyConverted(order_id));
    }
    if estimate.status != EstimateStatus::Approved {
        return Err(EstimateError::NotApproved(estimate.status));
    }
    Ok(())
}

pub fn ensure_deletable(estimate: &Estimate) -> Result<(), EstimateError> {
    if estimate.status == EstimateStatus::Approved || estimate.is_converted() {
        return Err(EstimateError::Locked);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: EstimateStatus, to: EstimateStatus },

    #[error("Estimate cannot be edited while {0}")]
    NotEditable(EstimateStatus),

    #[error("Only approved estimates can be converted (current status: {0})")]
    NotApproved(EstimateStatus),

    #[error("Estimate was already converted into order {0}")]
    AlreadyConverted(uuid::Uuid),

    #[error("Approved or converted estimates cannot be deleted")]
    Locked,
}

impl From<EstimateError> for CoreError {
    fn from(e: EstimateError) -> Self {
        CoreError::InvalidState(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn draft() -> Estimate {
        Estimate::new(Uuid::new_v4(), Some(Uuid::new_v4()))
    }

    #[test]
    fn test_happy_path() {
        let mut estimate = draft();
        send(&mut estimate).unwrap();
        approve(&mut estimate).unwrap();
        assert_eq!(estimate.status, EstimateStatus::Approved);
        assert!(ensure_convertible(&estimate).is_ok());
    }

    #[test]
    fn test_approve_requires_sent() {
        let mut estimate = draft();
        assert!(matches!(
            approve(&mut estimate),
            Err(EstimateError::InvalidTransition { from: EstimateStatus::Draft, .. })
        ));
        assert!(reject(&mut estimate).is_err());
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut estimate = draft();
        send(&mut estimate).unwrap();
        reject(&mut estimate).unwrap();
        assert!(approve(&mut estimate).is_err());
        assert!(send(&mut estimate).is_err());
        assert!(ensure_convertible(&estimate).is_err());
    }

    #[test]
    fn test_sent_estimate_cannot_be_converted() {
        let mut estimate = draft();
        send(&mut estimate).unwrap();
        let err: CoreError = ensure_convertible(&estimate).unwrap_err().into();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_converted_estimate_cannot_be_converted_again() {
        let mut estimate = draft();
        send(&mut estimate).unwrap();
        approve(&mut estimate).unwrap();
        estimate.converted_order_id = Some(Uuid::new_v4());
        assert!(matches!(
            ensure_convertible(&estimate),
            Err(EstimateError::AlreadyConverted(_))
        ));
    }

    #[test]
    fn test_only_drafts_are_editable() {
        let mut estimate = draft();
        assert!(ensure_editable(&estimate).is_ok());
        send(&mut estimate).unwrap();
        assert!(ensure_editable(&estimate).is_err());
    }

    #[test]
    fn test_approved_estimates_are_kept() {
        let mut estimate = draft();
        assert!(ensure_deletable(&estimate).is_ok());
        send(&mut estimate).unwrap();
        assert!(ensure_deletable(&estimate).is_ok());
        approve(&mut estimate).unwrap();
        assert!(ensure_deletable(&estimate).is_err());
    }
}
