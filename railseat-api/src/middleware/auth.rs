use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use railseat_core::models::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims issued by the identity provider. `sub` carries the numeric user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    pub exp: usize,
}

/// Identity resolved from the request credential, inserted into extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = resolve_user(&req, &state.auth.secret)?;
    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}

fn resolve_user(req: &Request, secret: &str) -> Result<UserId, AppError> {
    // 1. Extract token from Authorization header
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("Missing credential".to_string()))?;

    // Bearer scheme, or the bare token as older clients send it
    let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header).trim();

    // 2. Decode and validate JWT
    let token_data = decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid credential: {}", e)))?;

    // 3. Subject must be a user id
    match token_data.claims.sub.parse::<i64>() {
        Ok(id) if id > 0 => Ok(UserId(id)),
        _ => Err(AppError::AuthenticationError(
            "Credential subject is not a user id".to_string(),
        )),
    }
}
