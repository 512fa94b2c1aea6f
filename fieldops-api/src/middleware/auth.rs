use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use fieldops_core::{Actor, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims issued by the identity provider: the user id and a single role.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Result<Actor, AppError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthenticated("Token subject is not a user id".to_string()))?;
        let role: Role = self
            .role
            .parse()
            .map_err(|_| AppError::Unauthenticated(format!("Unknown role '{}'", self.role)))?;
        Ok(Actor::new(user_id, role))
    }
}

// ============================================================================
// Identity Middleware
// ============================================================================

/// Resolve the bearer token into an `Actor` and put it in the request
/// extensions. Anything short of a valid token is a 401.
pub async fn require_actor(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthenticated("Invalid or expired token".to_string())
    })?;

    let actor = token_data.claims.actor()?;
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}
