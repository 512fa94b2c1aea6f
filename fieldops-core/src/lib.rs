pub mod access;
pub mod geo;
pub mod identity;
pub mod money;
pub mod notify;
pub mod payment;

pub use access::Operation;
pub use geo::GeoPoint;
pub use identity::{Actor, Role, UserDirectory, UserRecord};
pub use notify::{LogNotifier, Notifier};
pub use payment::{GatewayEvent, GatewayOutcome, PaymentGateway, PaymentMethod};

/// Error taxonomy shared by every workflow in the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::InvalidState(_) => "invalid_state",
            CoreError::Validation(_) => "validation_error",
            CoreError::Conflict(_) => "conflict",
            CoreError::Upstream(_) => "upstream_failure",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("{} {} not found", entity, id))
    }

    /// Optimistic-lock failure on an aggregate row.
    pub fn stale(entity: &str, id: impl std::fmt::Display) -> Self {
        CoreError::Conflict(format!(
            "{} {} was modified concurrently; reload and retry",
            entity, id
        ))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
