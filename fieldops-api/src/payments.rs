use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use fieldops_core::{Actor, PaymentMethod};
use fieldops_order::{CaptureInput, Payment, Reconciliation};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub status: &'static str,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
}

impl From<Reconciliation> for CaptureResponse {
    fn from(result: Reconciliation) -> Self {
        match result {
            Reconciliation::Recorded(payment) => CaptureResponse {
                status: payment.status.as_str(),
                duplicate: false,
                payment: Some(payment),
            },
            Reconciliation::Duplicate { .. } => CaptureResponse {
                status: "duplicate",
                duplicate: true,
                payment: None,
            },
            Reconciliation::UnknownOrder { .. } => CaptureResponse {
                status: "ignored",
                duplicate: false,
                payment: None,
            },
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/{gateway}/capture", post(capture_payment))
        .route("/payments/{id}", get(get_payment))
}

/// POST /payments/{gateway}/capture
async fn capture_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(gateway): Path<String>,
    payload: Result<Json<CaptureInput>, JsonRejection>,
) -> AppResult<Json<CaptureResponse>> {
    let method: PaymentMethod = gateway.parse()?;
    let Json(input) = payload?;
    let result = state.payments.capture(&actor, method, input).await?;
    Ok(Json(result.into()))
}

/// GET /payments/{id}
async fn get_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Payment>> {
    Ok(Json(state.payments.get_payment(&actor, id).await?))
}
