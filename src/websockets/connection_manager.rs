use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::session::UserIdentity;
use crate::shared::AppError;

/// Broadcast group a live session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupId {
    Lobby(String),
    Game(i64),
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Lobby(id) => write!(f, "lobby:{id}"),
            GroupId::Game(id) => write!(f, "game:{id}"),
        }
    }
}

/// One open push connection, tagged at connect time
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSession {
    pub id: String,
    pub group: GroupId,
    pub user: UserIdentity,
}

impl LiveSession {
    pub fn new(group: GroupId, user: UserIdentity) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            group,
            user,
        }
    }
}

/// Join and leave side effects run by the lobby and game engines
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Runs while the session is pending, an error rejects the connection
    ///
    /// A pending session can be reached with `send_to` but is left out of
    /// broadcasts and `group_sessions`.
    async fn on_connect(&self, session: &LiveSession) -> Result<(), AppError>;

    async fn on_disconnect(&self, session: &LiveSession);
}

#[async_trait]
pub trait ConnectionManager: Send + Sync {
    fn register_listener(&self, listener: Arc<dyn SessionListener>);

    /// Registers the session as pending and runs the connect listeners
    ///
    /// The session joins its group once every listener accepted it. If a
    /// listener rejects it the session is dropped again without running the
    /// disconnect listeners.
    async fn add_connection(
        &self,
        session: LiveSession,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<(), AppError>;

    /// Unregisters the session and runs the disconnect listeners
    async fn remove_connection(&self, session_id: &str);

    async fn send_to(&self, session_id: &str, message: &str);

    async fn broadcast_to_group(&self, group: &GroupId, message: &str);

    async fn broadcast_to_group_except(&self, group: &GroupId, except_session_id: &str, message: &str);

    async fn group_sessions(&self, group: &GroupId) -> Vec<LiveSession>;
}

struct Registered {
    session: LiveSession,
    sender: mpsc::UnboundedSender<String>,
    accepted: bool,
}

impl Registered {
    fn is_member_of(&self, group: &GroupId) -> bool {
        self.accepted && &self.session.group == group
    }
}

pub struct InMemoryConnectionManager {
    // session id -> connection
    connections: Arc<RwLock<HashMap<String, Registered>>>,
    listeners: StdRwLock<Vec<Arc<dyn SessionListener>>>,
}

impl Default for InMemoryConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            listeners: StdRwLock::new(Vec::new()),
        }
    }

    // Snapshot so no lock is held while listeners run
    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.read().unwrap().clone()
    }

    async fn fan_out(&self, group: &GroupId, except: Option<&str>, message: &str) {
        let connections = self.connections.read().await;
        for (session_id, registered) in connections.iter() {
            if !registered.is_member_of(group) || Some(session_id.as_str()) == except {
                continue;
            }
            if registered.sender.send(message.to_string()).is_err() {
                warn!(session_id = %session_id, group = %group, "Failed to push message, receiver gone");
            }
        }
    }
}

#[async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    fn register_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    #[instrument(skip(self, session, sender), fields(session_id = %session.id, group = %session.group))]
    async fn add_connection(
        &self,
        session: LiveSession,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<(), AppError> {
        self.connections.write().await.insert(
            session.id.clone(),
            Registered {
                session: session.clone(),
                sender,
                accepted: false,
            },
        );

        for listener in self.listeners() {
            if let Err(e) = listener.on_connect(&session).await {
                warn!(error = %e, "Connection rejected by listener");
                self.connections.write().await.remove(&session.id);
                return Err(e);
            }
        }

        if let Some(registered) = self.connections.write().await.get_mut(&session.id) {
            registered.accepted = true;
        }

        debug!(user_id = %session.user.user_id, "Live session registered");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_connection(&self, session_id: &str) {
        let removed = self.connections.write().await.remove(session_id);
        let Some(registered) = removed else {
            debug!("Live session already gone");
            return;
        };

        for listener in self.listeners() {
            listener.on_disconnect(&registered.session).await;
        }
        debug!(group = %registered.session.group, "Live session removed");
    }

    async fn send_to(&self, session_id: &str, message: &str) {
        let connections = self.connections.read().await;
        match connections.get(session_id) {
            Some(registered) => {
                if registered.sender.send(message.to_string()).is_err() {
                    warn!(session_id = %session_id, "Failed to push message, receiver gone");
                }
            }
            None => debug!(session_id = %session_id, "No live session to send to"),
        }
    }

    async fn broadcast_to_group(&self, group: &GroupId, message: &str) {
        self.fan_out(group, None, message).await;
    }

    async fn broadcast_to_group_except(&self, group: &GroupId, except_session_id: &str, message: &str) {
        self.fan_out(group, Some(except_session_id), message).await;
    }

    async fn group_sessions(&self, group: &GroupId) -> Vec<LiveSession> {
        self.connections
            .read()
            .await
            .values()
            .filter(|registered| registered.is_member_of(group))
            .map(|registered| registered.session.clone())
            .collect()
    }
}
