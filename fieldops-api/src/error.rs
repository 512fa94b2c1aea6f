use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fieldops_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid credentials.
    Unauthenticated(String),
    /// Webhook body or signature rejected before reaching the core.
    BadRequest(String),
    Core(CoreError),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Core(err) => {
                let status = match err {
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                    CoreError::InvalidState(_) => StatusCode::CONFLICT,
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind(), err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", message);
            "Internal Server Error".to_string()
        } else {
            message
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Core(err)
    }
}

/// Malformed or unexpected JSON (including unknown patch fields) is a
/// validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Core(CoreError::Validation(rejection.body_text()))
    }
}

pub type AppResult<T> = Result<T, AppError>;
