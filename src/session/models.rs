use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Login session kept in the ephemeral store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionModel {
    pub id: String,      // UUID v4, also the JWT's session_id claim
    pub user_id: String, // Stable identity the game engine sees
    pub username: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionModel {
    /// Creates a guest session with a fresh user id
    pub fn guest(username: String, expiration_days: i64) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            display_name: username.clone(),
            username,
            created_at: now,
            expires_at: now + chrono::Duration::days(expiration_days),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Pending OAuth handshake, consumed once by the callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthStateModel {
    pub state: String,
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
}

impl OAuthStateModel {
    pub fn new(redirect_url: &str) -> Self {
        Self {
            state: Uuid::new_v4().simple().to_string(),
            redirect_url: redirect_url.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_session() {
        let session = SessionModel::guest("brave-otter".to_string(), 7);

        assert_eq!(session.display_name, "brave-otter");
        assert_ne!(session.id, session.user_id);
        assert!(session.expires_at > session.created_at);
        assert!(!session.is_expired());

        assert!(SessionModel::guest("x".to_string(), -1).is_expired());
    }
}
