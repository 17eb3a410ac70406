use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::models::SessionModel;
use super::types::SessionClaims;
use crate::config::AppConfig;
use crate::shared::AppError;

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
    pub expiration_days: i64,
}

impl TokenConfig {
    pub fn new(secret: &str, expiration_days: i64) -> Self {
        Self {
            secret: secret.to_string(),
            expiration_days,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.session_expiration_days)
    }

    /// Signs a token carrying the session and user ids
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn create_token(&self, session: &SessionModel) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = (now + Duration::days(self.expiration_days)).timestamp() as usize;

        debug!(
            expiration_days = self.expiration_days,
            exp_timestamp = exp,
            "Creating JWT token with expiration"
        );

        let claims = SessionClaims {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            exp,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Validates signature and expiry and returns the claims
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::JwtError(e.to_string())
        })
    }
}
