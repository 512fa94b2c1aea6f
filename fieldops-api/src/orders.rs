use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use fieldops_core::Actor;
use fieldops_order::{Assignment, NewOrder, Order, OrderPatch, Payment, StatusUpdate};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// Omit `technician_id` to let the matcher choose.
#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    pub technician_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{id}", get(get_order).put(update_order))
        .route("/orders/{id}/assign-technician", post(assign_technician))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/cancel", put(cancel_order))
        .route("/orders/{id}/payments", get(list_payments))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /orders
async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let Json(input) = payload?;
    let order = state.orders.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders?status=pending
async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.list(&actor, query.status.as_deref()).await?))
}

/// GET /orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(&actor, id).await?))
}

/// PUT /orders/{id}
///
/// Technicians may only send `status`, `actual_start_time` and
/// `actual_end_time`.
async fn update_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Result<Json<OrderPatch>, JsonRejection>,
) -> AppResult<Json<Order>> {
    let Json(patch) = payload?;
    Ok(Json(state.orders.update(&actor, id, patch).await?))
}

/// POST /orders/{id}/assign-technician
async fn assign_technician(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Option<Json<AssignRequest>>,
) -> AppResult<Json<Assignment>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.orders.assign(&actor, id, request.technician_id).await?))
}

/// PUT /orders/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> AppResult<Json<Order>> {
    let Json(update) = payload?;
    Ok(Json(state.orders.update_status(&actor, id, update).await?))
}

/// PUT /orders/{id}/cancel
async fn cancel_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.cancel(&actor, id).await?))
}

/// GET /orders/{id}/payments
async fn list_payments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.payments.list_for_order(&actor, id).await?))
}
