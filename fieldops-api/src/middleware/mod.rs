pub mod access;
pub mod auth;
pub mod resiliency;

pub use access::enforce_policy;
pub use auth::{require_actor, Claims};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker};
