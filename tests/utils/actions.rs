#![allow(dead_code)] // Test utilities may not all be used in every test

use tokio::sync::mpsc;

use geoguess::{
    game::models::GameModel,
    lobby::types::CreateLobbyRequest,
    lobby::LobbyModel,
    websockets::{ClientMessage, GroupId, LiveSession, MessageHandler},
    AppError, ConnectionManager,
};

use super::clients::LiveClient;
use super::setup::{identity, TestSetup};

// ============================================================================
// Action Helpers
// ============================================================================

impl TestSetup {
    async fn connect(&self, group: GroupId, user_id: &str) -> Result<LiveClient, AppError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session = LiveSession::new(group, identity(user_id));
        self.connection_manager
            .add_connection(session.clone(), sender)
            .await?;
        Ok(LiveClient::new(session, receiver))
    }

    /// Opens a lobby channel the way the upgrade handler does
    pub async fn connect_lobby(&self, user_id: &str, lobby_id: &str) -> Result<LiveClient, AppError> {
        self.connect(GroupId::Lobby(lobby_id.to_string()), user_id)
            .await
    }

    /// Opens a game channel the way the upgrade handler does
    pub async fn connect_game(&self, user_id: &str, game_id: i64) -> Result<LiveClient, AppError> {
        // Same membership gate as the upgrade handler
        self.state.multiplayer.get_game(user_id, game_id).await?;
        self.connect(GroupId::Game(game_id), user_id).await
    }

    pub async fn disconnect(&self, client: &LiveClient) {
        self.connection_manager
            .remove_connection(&client.session.id)
            .await;
    }

    /// Delivers a client message to the channel's handler
    pub async fn send(&self, client: &LiveClient, message: ClientMessage) {
        let raw = serde_json::to_string(&message).unwrap();
        self.send_raw(client, &raw).await;
    }

    pub async fn send_raw(&self, client: &LiveClient, raw: &str) {
        match &client.session.group {
            GroupId::Lobby(_) => {
                self.state
                    .lobby_live
                    .handle_message(&client.session, raw.to_string())
                    .await
            }
            GroupId::Game(_) => {
                self.state
                    .game_live
                    .handle_message(&client.session, raw.to_string())
                    .await
            }
        }
    }

    // ============================================================================
    // Convenience Action Methods
    // ============================================================================

    pub async fn create_lobby(&self, creator: &str, rounds: i32, max_players: i32) -> LobbyModel {
        let request: CreateLobbyRequest = serde_json::from_value(serde_json::json!({
            "rounds": rounds,
            "timer_seconds": 30,
            "max_players": max_players,
        }))
        .unwrap();
        self.state
            .lobby_service
            .create_lobby(creator, request)
            .await
            .unwrap()
    }

    /// Creates a multiplayer game through the lobby, with the given users connected
    pub async fn start_game_via_lobby(&self, creator: &str, others: &[&str]) -> GameModel {
        let lobby = self.create_lobby(creator, 3, 8).await;

        let mut clients = vec![self.connect_lobby(creator, &lobby.id).await.unwrap()];
        for user in others {
            clients.push(self.connect_lobby(user, &lobby.id).await.unwrap());
        }

        let game = self
            .state
            .lobby_live
            .start_game(creator, &lobby.id)
            .await
            .unwrap();

        for client in &clients {
            self.disconnect(client).await;
        }
        game
    }
}
