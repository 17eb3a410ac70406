use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::connection_manager::{ConnectionManager, GroupId, LiveSession};
use super::messages::ServerMessage;
use super::socket::{Connection, MessageHandler, SocketWrapper};
use crate::session::UserIdentity;
use crate::shared::{AppError, AppState};

/// Validates the JWT carried in the Sec-WebSocket-Protocol header
///
/// Returns the token too, the upgrade has to echo it back as the selected protocol.
async fn authenticate(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<(UserIdentity, String), AppError> {
    let token = headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing or invalid Sec-WebSocket-Protocol header");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

    let (_, identity) = state.session_service.validate_session(token).await?;
    Ok((identity, token.to_string()))
}

/// GET /ws/lobby/{id} with JWT token in Sec-WebSocket-Protocol header
pub async fn lobby_websocket_handler(
    ws: WebSocketUpgrade,
    Path(lobby_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let (user, token) = authenticate(&headers, &state).await?;

    // Reject unknown lobbies before upgrading, seats are taken on connect
    state.lobby_service.get_lobby(&lobby_id).await?;

    info!(lobby_id = %lobby_id, user_id = %user.user_id, "Lobby channel requested");
    let session = LiveSession::new(GroupId::Lobby(lobby_id), user);
    let handler: Arc<dyn MessageHandler> = state.lobby_live.clone();
    let manager = Arc::clone(&state.connection_manager);

    Ok(ws
        .protocols([token])
        .on_upgrade(move |socket| run_live_session(socket, session, handler, manager)))
}

/// GET /ws/game/{id}, only players of the game may connect
pub async fn game_websocket_handler(
    ws: WebSocketUpgrade,
    Path(game_id): Path<i64>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let (user, token) = authenticate(&headers, &state).await?;
    state.multiplayer.get_game(&user.user_id, game_id).await?;

    info!(game_id, user_id = %user.user_id, "Game channel requested");
    let session = LiveSession::new(GroupId::Game(game_id), user);
    let handler: Arc<dyn MessageHandler> = state.game_live.clone();
    let manager = Arc::clone(&state.connection_manager);

    Ok(ws
        .protocols([token])
        .on_upgrade(move |socket| run_live_session(socket, session, handler, manager)))
}

/// Registers the session, pumps it until disconnect and unregisters it
async fn run_live_session(
    mut socket: WebSocket,
    session: LiveSession,
    handler: Arc<dyn MessageHandler>,
    manager: Arc<dyn ConnectionManager>,
) {
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    if let Err(e) = manager.add_connection(session.clone(), outbound_sender).await {
        let _ = socket
            .send_message(ServerMessage::from_error(&e).to_json())
            .await;
        let _ = socket.close().await;
        return;
    }

    info!(
        session_id = %session.id,
        group = %session.group,
        user_id = %session.user.user_id,
        "Live connection established"
    );

    let session_id = session.id.clone();
    let connection = Connection::new(session, Box::new(socket), outbound_receiver, handler);
    match connection.run().await {
        Ok(()) => info!(session_id = %session_id, "Live connection closed cleanly"),
        Err(e) => warn!(session_id = %session_id, error = ?e, "Live connection error"),
    }

    manager.remove_connection(&session_id).await;
}
