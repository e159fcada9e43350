use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{Algorithm, Validation, decode};
use tracing::debug;

use threadbook_types::UserId;
use threadbook_types::api::SessionClaims;

use crate::state::AppState;

/// Authenticated caller, as asserted by the session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

/// Validate the bearer session JWT and attach a [`Session`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode::<SessionClaims>(bearer.token(), &state.session_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| {
            debug!("session rejected: {}", e);
            StatusCode::UNAUTHORIZED
        })?
        .claims;

    if claims.sub <= 0 || claims.username.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut().insert(Session {
        user_id: claims.sub,
        username: claims.username,
    });
    Ok(next.run(req).await)
}
