use axum::{http::Method, middleware::from_fn, middleware::from_fn_with_state, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod estimates;
pub mod invoices;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod signature;
pub mod state;
pub mod webhooks;

pub use error::AppError;
pub use state::{AppState, Repositories};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Later route_layer calls wrap the earlier ones, so identity runs first.
    let authenticated = Router::new()
        .merge(estimates::routes())
        .merge(orders::routes())
        .merge(invoices::routes())
        .merge(payments::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::circuit_breaker_middleware))
        .route_layer(from_fn(middleware::enforce_policy))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_actor));

    Router::new()
        .merge(authenticated)
        .merge(webhooks::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
