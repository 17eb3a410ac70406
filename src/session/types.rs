use serde::{Deserialize, Serialize};

use super::models::SessionModel;

/// JWT claims structure containing session information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// Authenticated caller as seen by the game and lobby engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
}

impl From<&SessionModel> for UserIdentity {
    fn from(session: &SessionModel) -> Self {
        Self {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            display_name: session.display_name.clone(),
        }
    }
}

/// Response structure for session creation endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionResponse {
    pub token: String, // The JWT
    pub user_id: String,
    pub username: String,
}
