use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::{info, instrument};

use super::types::{SessionClaims, SessionResponse, UserIdentity};
use crate::shared::{AppError, AppState};

/// HTTP handler for creating a new guest session
///
/// POST /session
/// Returns a JWT token and the generated username
#[instrument(name = "create_session", skip(state))]
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.session_service.create_guest_session().await?;

    info!(
        username = %session.username,
        user_id = %session.user_id,
        "Session created successfully"
    );

    Ok(Json(session))
}

/// GET /session
pub async fn current_session(Extension(user): Extension<UserIdentity>) -> Json<UserIdentity> {
    Json(user)
}

/// DELETE /session
#[instrument(name = "revoke_session", skip(state, claims), fields(session_id = %claims.session_id))]
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<StatusCode, AppError> {
    state
        .session_service
        .revoke_session(&claims.session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::jwt_auth;
    use crate::shared::AppStateBuilder;
    use axum::{
        body::Body,
        http::Request,
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        let protected = get(current_session)
            .delete(revoke_session)
            .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

        Router::new()
            .route("/session", post(create_session).merge(protected))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_create_session_handler() {
        let app = app(AppStateBuilder::new().build());

        let request = Request::builder()
            .method("POST")
            .uri("/session")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let session: SessionResponse = serde_json::from_slice(&body).unwrap();

        assert!(!session.token.is_empty());
        assert!(!session.user_id.is_empty());
        assert!(session.username.contains('-')); // Pet names have dashes
    }

    #[tokio::test]
    async fn test_revoked_token_stops_working() {
        let state = AppStateBuilder::new().build();
        let session = state.session_service.create_guest_session().await.unwrap();
        let bearer = format!("Bearer {}", session.token);

        let with_token = |method: &str| {
            Request::builder()
                .method(method)
                .uri("/session")
                .header("Authorization", bearer.as_str())
                .body(Body::empty())
                .unwrap()
        };

        let me = app(state.clone()).oneshot(with_token("GET")).await.unwrap();
        assert_eq!(me.status(), StatusCode::OK);

        let revoked = app(state.clone())
            .oneshot(with_token("DELETE"))
            .await
            .unwrap();
        assert_eq!(revoked.status(), StatusCode::NO_CONTENT);

        let after = app(state).oneshot(with_token("GET")).await.unwrap();
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }
}
