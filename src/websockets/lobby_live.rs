use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::connection_manager::{ConnectionManager, GroupId, LiveSession, SessionListener};
use super::messages::{ClientMessage, ServerMessage};
use super::socket::MessageHandler;
use crate::game::models::GameModel;
use crate::lobby::LobbyService;
use crate::shared::AppError;

/// Live side of the lobby: seats, roster, chat and promotion to a game
pub struct LobbyLiveHandler {
    lobby_service: Arc<LobbyService>,
    connection_manager: Arc<dyn ConnectionManager>,
}

impl LobbyLiveHandler {
    pub fn new(
        lobby_service: Arc<LobbyService>,
        connection_manager: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            lobby_service,
            connection_manager,
        }
    }

    /// Promotes the lobby with whoever is connected right now and redirects them
    #[instrument(skip(self))]
    pub async fn start_game(&self, user_id: &str, lobby_id: &str) -> Result<GameModel, AppError> {
        let group = GroupId::Lobby(lobby_id.to_string());

        let mut roster: Vec<String> = Vec::new();
        for session in self.connection_manager.group_sessions(&group).await {
            if !roster.contains(&session.user.user_id) {
                roster.push(session.user.user_id);
            }
        }

        let game = self
            .lobby_service
            .start_game(user_id, lobby_id, roster)
            .await?;

        self.connection_manager
            .broadcast_to_group(&group, &ServerMessage::GameRedirect { game_id: game.id }.to_json())
            .await;
        info!(lobby_id = %lobby_id, game_id = game.id, "Lobby members redirected to game");
        Ok(game)
    }
}

#[async_trait]
impl SessionListener for LobbyLiveHandler {
    async fn on_connect(&self, session: &LiveSession) -> Result<(), AppError> {
        let GroupId::Lobby(lobby_id) = &session.group else {
            return Ok(());
        };

        self.lobby_service.connect(lobby_id).await?;

        self.connection_manager
            .broadcast_to_group_except(
                &session.group,
                &session.id,
                &ServerMessage::UserConnected {
                    user: session.user.clone(),
                }
                .to_json(),
            )
            .await;

        // The joiner is not listed by group_sessions until every listener accepted it
        let mut users: Vec<_> = self
            .connection_manager
            .group_sessions(&session.group)
            .await
            .into_iter()
            .map(|s| s.user)
            .collect();
        users.push(session.user.clone());
        self.connection_manager
            .send_to(&session.id, &ServerMessage::Roster { users }.to_json())
            .await;

        debug!(lobby_id = %lobby_id, user_id = %session.user.user_id, "User joined lobby channel");
        Ok(())
    }

    async fn on_disconnect(&self, session: &LiveSession) {
        let GroupId::Lobby(lobby_id) = &session.group else {
            return;
        };

        if let Err(e) = self.lobby_service.disconnect(lobby_id).await {
            warn!(lobby_id = %lobby_id, error = %e, "Failed to free lobby seat");
        }

        self.connection_manager
            .broadcast_to_group(
                &session.group,
                &ServerMessage::UserDisconnected {
                    user: session.user.clone(),
                }
                .to_json(),
            )
            .await;
    }
}

#[async_trait]
impl MessageHandler for LobbyLiveHandler {
    async fn handle_message(&self, session: &LiveSession, message: String) {
        let GroupId::Lobby(lobby_id) = &session.group else {
            return;
        };

        let reply = match serde_json::from_str::<ClientMessage>(&message) {
            Ok(ClientMessage::ChatMessage { content }) => {
                self.connection_manager
                    .broadcast_to_group(
                        &session.group,
                        &ServerMessage::ChatMessage {
                            user: session.user.clone(),
                            content,
                        }
                        .to_json(),
                    )
                    .await;
                None
            }
            Ok(ClientMessage::StartGame) => {
                match self.start_game(&session.user.user_id, lobby_id).await {
                    Ok(_) => None,
                    Err(e) => Some(ServerMessage::from_error(&e)),
                }
            }
            Ok(other) => {
                debug!(message = ?other, "Message not supported on lobby channel");
                Some(ServerMessage::error("Message not supported in a lobby"))
            }
            Err(e) => {
                warn!(lobby_id = %lobby_id, error = %e, "Failed to parse live message");
                Some(ServerMessage::error("Malformed message"))
            }
        };

        if let Some(reply) = reply {
            self.connection_manager
                .send_to(&session.id, &reply.to_json())
                .await;
        }
    }
}
