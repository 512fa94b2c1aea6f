use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use fieldops_core::Actor;
use fieldops_order::{Invoice, InvoicePatch, InvoiceSummary, NewInvoice};
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/reports/summary", get(invoice_summary))
        .route("/invoices/{id}", get(get_invoice).put(update_invoice))
}

/// POST /invoices
async fn create_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<NewInvoice>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Invoice>)> {
    let Json(input) = payload?;
    let invoice = state.invoices.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<Json<Vec<Invoice>>> {
    Ok(Json(state.invoices.list(&actor).await?))
}

async fn get_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(state.invoices.get(&actor, id).await?))
}

/// PUT /invoices/{id}
async fn update_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Result<Json<InvoicePatch>, JsonRejection>,
) -> AppResult<Json<Invoice>> {
    let Json(patch) = payload?;
    Ok(Json(state.invoices.update(&actor, id, patch).await?))
}

/// GET /invoices/reports/summary
async fn invoice_summary(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<Json<InvoiceSummary>> {
    Ok(Json(state.invoices.summary(&actor).await?))
}
