use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{
    models::{OAuthStateModel, SessionModel},
    repository::SessionRepository,
    token::TokenConfig,
    types::{SessionClaims, SessionResponse, UserIdentity},
};
use crate::shared::AppError;

/// Service for handling session business logic
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    token_config: TokenConfig,
    oauth_state_ttl: Duration,
}

impl SessionService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        token_config: TokenConfig,
        oauth_state_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            token_config,
            oauth_state_ttl,
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.token_config.expiration_days.max(0) as u64 * 24 * 60 * 60)
    }

    /// Creates a guest session with a generated username and signs its token
    #[instrument(skip(self))]
    pub async fn create_guest_session(&self) -> Result<SessionResponse, AppError> {
        let username = petname::Petnames::default().generate_one(2, "-");
        let session = SessionModel::guest(username, self.token_config.expiration_days);

        self.repository
            .create_session(&session, self.session_ttl())
            .await?;
        let token = self.token_config.create_token(&session)?;

        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            username = %session.username,
            "Guest session created"
        );

        Ok(SessionResponse {
            token,
            user_id: session.user_id,
            username: session.username,
        })
    }

    /// Checks the token and that its session is still alive
    #[instrument(skip(self, token))]
    pub async fn validate_session(
        &self,
        token: &str,
    ) -> Result<(SessionClaims, UserIdentity), AppError> {
        let claims = self.token_config.validate_token(token)?;

        match self.repository.get_session(&claims.session_id).await? {
            Some(session) if !session.is_expired() => {
                let identity = UserIdentity::from(&session);
                Ok((claims, identity))
            }
            Some(_) => {
                warn!(session_id = %claims.session_id, "Session has expired");
                Err(AppError::Unauthorized("Session has expired".to_string()))
            }
            None => {
                warn!(
                    session_id = %claims.session_id,
                    "Session not found - may have been revoked"
                );
                Err(AppError::Unauthorized(
                    "Session not found or has been revoked".to_string(),
                ))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), AppError> {
        self.repository.delete_session(session_id).await?;
        info!(session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Starts an OAuth handshake, the returned state goes to the identity provider
    #[instrument(skip(self))]
    pub async fn begin_oauth(&self, redirect_url: &str) -> Result<OAuthStateModel, AppError> {
        let state = OAuthStateModel::new(redirect_url);
        self.repository
            .create_oauth_state(&state, self.oauth_state_ttl)
            .await?;
        Ok(state)
    }

    /// Redeems a handshake state, each state is accepted at most once
    #[instrument(skip(self, state))]
    pub async fn complete_oauth(&self, state: &str) -> Result<OAuthStateModel, AppError> {
        self.repository
            .consume_oauth_state(state)
            .await?
            .ok_or_else(|| {
                warn!("Unknown or expired OAuth state");
                AppError::Unauthorized("Unknown or expired OAuth state".to_string())
            })
    }

    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        self.repository.purge_expired().await
    }
}
