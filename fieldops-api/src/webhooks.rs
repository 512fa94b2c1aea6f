use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use fieldops_core::{GatewayEvent, GatewayOutcome, PaymentMethod};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::signature;
use crate::state::AppState;

// ============================================================================
// Gateway payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeData,
}

#[derive(Debug, Deserialize)]
pub struct StripeData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    /// Minor units.
    pub amount: i64,
    /// Minor units actually captured; preferred over `amount` when present.
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalWebhook {
    pub event_type: String,
    pub resource: Value,
}

#[derive(Debug, Deserialize)]
pub struct PaypalCapture {
    pub id: String,
    pub amount: PaypalAmount,
    pub custom_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaypalAmount {
    pub value: Decimal,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/{gateway}", post(handle_webhook))
}

fn signature_header(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Stripe => "stripe-signature",
        PaymentMethod::Paypal => "paypal-signature",
    }
}

fn bad_payload(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Malformed webhook payload: {}", e))
}

fn parse_uuid(field: &str, value: Option<&String>) -> AppResult<Uuid> {
    let value = value.ok_or_else(|| AppError::BadRequest(format!("Webhook is missing {}", field)))?;
    Uuid::parse_str(value).map_err(|_| AppError::BadRequest(format!("Webhook {} is not a UUID", field)))
}

/// `payment_intent.succeeded` / `payment_intent.payment_failed`; anything
/// else is acknowledged without processing.
pub fn parse_stripe(payload: Value) -> AppResult<Option<GatewayEvent>> {
    let webhook: StripeWebhook = serde_json::from_value(payload.clone()).map_err(bad_payload)?;

    let outcome = match webhook.type_.as_str() {
        "payment_intent.succeeded" => GatewayOutcome::Completed,
        "payment_intent.payment_failed" => GatewayOutcome::Failed,
        _ => return Ok(None),
    };

    let intent: PaymentIntentObject = serde_json::from_value(webhook.data.object).map_err(bad_payload)?;
    let order_id = parse_uuid("metadata.order_id", intent.metadata.get("order_id"))?;
    let client_id = intent
        .metadata
        .get("client_id")
        .map(|v| parse_uuid("metadata.client_id", Some(v)))
        .transpose()?;

    Ok(Some(GatewayEvent {
        method: PaymentMethod::Stripe,
        order_id,
        client_id,
        amount: Decimal::new(intent.amount_received.unwrap_or(intent.amount), 2),
        transaction_id: intent.id,
        outcome,
        payload,
    }))
}

/// `PAYMENT.CAPTURE.COMPLETED` / `DENIED` / `DECLINED`.
pub fn parse_paypal(payload: Value) -> AppResult<Option<GatewayEvent>> {
    let webhook: PaypalWebhook = serde_json::from_value(payload.clone()).map_err(bad_payload)?;

    let outcome = match webhook.event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => GatewayOutcome::Completed,
        "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => GatewayOutcome::Failed,
        _ => return Ok(None),
    };

    let capture: PaypalCapture = serde_json::from_value(webhook.resource).map_err(bad_payload)?;
    let order_id = parse_uuid("custom_id", Some(&capture.custom_id))?;

    Ok(Some(GatewayEvent {
        method: PaymentMethod::Paypal,
        order_id,
        client_id: None,
        amount: capture.amount.value,
        transaction_id: capture.id,
        outcome,
        payload,
    }))
}

/// POST /webhooks/{gateway}
///
/// Answers `{"status": "success"}` once the event is processed, including
/// replays of an already recorded transaction.
async fn handle_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let method: PaymentMethod = gateway.parse()?;

    let secret = match method {
        PaymentMethod::Stripe => state.webhooks.stripe_secret.as_deref(),
        PaymentMethod::Paypal => state.webhooks.paypal_secret.as_deref(),
    };
    match secret {
        Some(secret) => {
            let header = headers
                .get(signature_header(method))
                .and_then(|h| h.to_str().ok());
            signature::verify(
                secret,
                header,
                &body,
                Utc::now().timestamp(),
                state.webhooks.tolerance_seconds,
            )
            .map_err(|e| {
                tracing::warn!("Rejected {} webhook: {}", method, e);
                AppError::BadRequest(e.to_string())
            })?;
        }
        None if state.webhooks.allow_unsigned => {
            tracing::warn!("Accepting unsigned {} webhook; no signing secret configured", method);
        }
        None => {
            tracing::error!("Rejected {} webhook: no signing secret configured", method);
            return Err(AppError::BadRequest(format!(
                "Webhooks for {} are not configured",
                method
            )));
        }
    }

    let payload: Value = serde_json::from_slice(&body).map_err(bad_payload)?;
    let event = match method {
        PaymentMethod::Stripe => parse_stripe(payload)?,
        PaymentMethod::Paypal => parse_paypal(payload)?,
    };

    match event {
        Some(event) => {
            let result = state.payments.reconcile(event).await?;
            if result.is_duplicate() {
                tracing::debug!("{} webhook replay acknowledged", method);
            }
        }
        None => tracing::debug!("Ignoring unhandled {} webhook event", method),
    }

    Ok(Json(json!({ "status": "success" })))
}
