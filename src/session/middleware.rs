use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::shared::{AppError, AppState};

/// JWT authentication middleware - validates the Authorization Bearer header.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), session::jwt_auth))
/// Handlers can then extract Extension(user): Extension<UserIdentity>,
/// or Extension(claims): Extension<SessionClaims> when they need the session id.
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header in request");
            AppError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid Authorization header format (expected Bearer token)");
        AppError::Unauthorized("Invalid authorization header format".to_string())
    })?;

    let (claims, identity) = match state.session_service.validate_session(token).await {
        Ok(validated) => validated,
        Err(e) => {
            warn!("JWT authentication failed: {}", e);
            return Err(e);
        }
    };

    debug!(
        user_id = %identity.user_id,
        session_id = %claims.session_id,
        "Authentication successful, adding identity to request"
    );

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
