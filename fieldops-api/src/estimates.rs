use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use fieldops_core::Actor;
use fieldops_estimate::{Conversion, ConversionOptions, Estimate, EstimatePatch, NewEstimate};
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/estimates", post(create_estimate).get(list_estimates))
        .route(
            "/estimates/{id}",
            get(get_estimate).put(update_estimate).delete(delete_estimate),
        )
        .route("/estimates/{id}/send", post(send_estimate))
        .route("/estimates/{id}/approve", post(approve_estimate))
        .route("/estimates/{id}/reject", post(reject_estimate))
        .route("/estimates/{id}/convert-to-order", post(convert_estimate))
}

/// POST /estimates
async fn create_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<NewEstimate>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Estimate>)> {
    let Json(input) = payload?;
    let estimate = state.estimates.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(estimate)))
}

/// GET /estimates
async fn list_estimates(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<Json<Vec<Estimate>>> {
    Ok(Json(state.estimates.list(&actor).await?))
}

/// GET /estimates/{id}
async fn get_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Estimate>> {
    Ok(Json(state.estimates.get(&actor, id).await?))
}

/// PUT /estimates/{id}
async fn update_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Result<Json<EstimatePatch>, JsonRejection>,
) -> AppResult<Json<Estimate>> {
    let Json(patch) = payload?;
    Ok(Json(state.estimates.update(&actor, id, patch).await?))
}

/// DELETE /estimates/{id}
async fn delete_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.estimates.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Estimate>> {
    Ok(Json(state.estimates.send(&actor, id).await?))
}

async fn approve_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Estimate>> {
    Ok(Json(state.estimates.approve(&actor, id).await?))
}

async fn reject_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Estimate>> {
    Ok(Json(state.estimates.reject(&actor, id).await?))
}

/// POST /estimates/{id}/convert-to-order
///
/// The body is optional; an empty body converts with defaults.
async fn convert_estimate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ConversionOptions>>,
) -> AppResult<(StatusCode, Json<Conversion>)> {
    let options = payload.map(|Json(o)| o).unwrap_or_default();
    let conversion = state.estimates.convert_to_order(&actor, id, options).await?;
    Ok((StatusCode::CREATED, Json(conversion)))
}
