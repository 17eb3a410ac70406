use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::models::{OAuthStateModel, SessionModel};
use crate::shared::AppError;

/// Ephemeral store for login sessions and OAuth handshake state
///
/// Every entry is written with a TTL and reads as absent once it lapses.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &SessionModel, ttl: Duration) -> Result<(), AppError>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), AppError>;

    async fn create_oauth_state(&self, state: &OAuthStateModel, ttl: Duration)
        -> Result<(), AppError>;

    /// Reads and removes a handshake state in one step
    async fn consume_oauth_state(&self, state: &str) -> Result<Option<OAuthStateModel>, AppError>;

    /// Drops lapsed entries of both kinds, returns how many were removed
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn new(value: &T, ttl: Duration) -> Self {
        Self {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self, now: Instant) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// In-memory implementation of SessionRepository for development and testing
///
/// Data is lost when the application restarts.
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, Expiring<SessionModel>>>,
    oauth_states: Mutex<HashMap<String, Expiring<OAuthStateModel>>>,
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            oauth_states: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored sessions, including lapsed ones not yet purged
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    #[instrument(skip(self, session))]
    async fn create_session(&self, session: &SessionModel, ttl: Duration) -> Result<(), AppError> {
        debug!(session_id = %session.id, username = %session.username, "Creating session in memory");

        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session already exists in memory");
            return Err(AppError::DatabaseError(
                "Session already exists".to_string(),
            ));
        }
        sessions.insert(session.id.clone(), Expiring::new(session, ttl));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get(session_id)
            .and_then(|entry| entry.live(Instant::now()));

        if session.is_none() {
            debug!(session_id = %session_id, "Session not found in memory");
        }
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.remove(session_id).is_none() {
            warn!(session_id = %session_id, "Session not found for deletion in memory");
            return Err(AppError::NotFound("Session not found".to_string()));
        }

        debug!(session_id = %session_id, "Session deleted from memory");
        Ok(())
    }

    #[instrument(skip(self, state))]
    async fn create_oauth_state(
        &self,
        state: &OAuthStateModel,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.oauth_states
            .lock()
            .unwrap()
            .insert(state.state.clone(), Expiring::new(state, ttl));
        Ok(())
    }

    #[instrument(skip(self, state))]
    async fn consume_oauth_state(&self, state: &str) -> Result<Option<OAuthStateModel>, AppError> {
        Ok(self
            .oauth_states
            .lock()
            .unwrap()
            .remove(state)
            .and_then(|entry| entry.live(Instant::now())))
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = Instant::now();

        let mut sessions = self.sessions.lock().unwrap();
        let initial_sessions = sessions.len();
        sessions.retain(|_, entry| now < entry.expires_at);
        let removed_sessions = initial_sessions - sessions.len();
        drop(sessions);

        let mut states = self.oauth_states.lock().unwrap();
        let initial_states = states.len();
        states.retain(|_, entry| now < entry.expires_at);
        let removed_states = initial_states - states.len();

        debug!(
            expired_sessions_removed = removed_sessions,
            expired_oauth_states_removed = removed_states,
            "Expired session entries purged from memory"
        );
        Ok((removed_sessions + removed_states) as u64)
    }
}
