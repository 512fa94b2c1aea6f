use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Paypal => "paypal",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentMethod::Stripe),
            "paypal" => Ok(PaymentMethod::Paypal),
            other => Err(CoreError::NotFound(format!(
                "Payment gateway '{}' not supported",
                other
            ))),
        }
    }
}

/// What the gateway reported for a charge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Completed,
    Failed,
}

/// A charge result delivered by a gateway, either from a webhook or as the
/// response to a capture call. The reconciler trusts these as delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub method: PaymentMethod,
    pub order_id: Uuid,
    pub client_id: Option<Uuid>,
    pub amount: Decimal,
    pub transaction_id: String,
    pub outcome: GatewayOutcome,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub method: PaymentMethod,
    pub order_id: Uuid,
    pub client_id: Uuid,
    /// Gateway-side handle of the authorized charge (intent id, capture id).
    pub reference: String,
    pub amount: Decimal,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture an authorized charge. Transport and gateway errors are
    /// reported as `CoreError::Upstream`; a declined charge is not an error.
    async fn capture(&self, request: &CaptureRequest) -> CoreResult<GatewayEvent>;
}

/// Offline gateway used in development and tests.
///
/// References starting with `fail-gateway` simulate an unreachable gateway,
/// references starting with `declined` produce a failed charge, everything
/// else completes with the reference as transaction id.
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn capture(&self, request: &CaptureRequest) -> CoreResult<GatewayEvent> {
        if request.reference.starts_with("fail-gateway") {
            return Err(CoreError::Upstream(format!(
                "{} gateway unavailable",
                request.method
            )));
        }

        let outcome = if request.reference.starts_with("declined") {
            GatewayOutcome::Failed
        } else {
            GatewayOutcome::Completed
        };

        Ok(GatewayEvent {
            method: request.method,
            order_id: request.order_id,
            client_id: Some(request.client_id),
            amount: request.amount,
            transaction_id: request.reference.clone(),
            outcome,
            payload: serde_json::json!({
                "sandbox": true,
                "reference": request.reference,
                "amount": request.amount.to_string(),
            }),
        })
    }
}
