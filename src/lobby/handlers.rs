use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};

use super::models::LobbyModel;
use super::types::{CreateLobbyRequest, StartGameResponse};
use crate::session::UserIdentity;
use crate::shared::{AppError, AppState, Pagination};

/// HTTP handler for creating a new lobby
///
/// POST /lobby
#[instrument(name = "create_lobby", skip(state, user, request), fields(user_id = %user.user_id))]
pub async fn create_lobby(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(request): Json<CreateLobbyRequest>,
) -> Result<Json<LobbyModel>, AppError> {
    let lobby = state
        .lobby_service
        .create_lobby(&user.user_id, request)
        .await?;
    Ok(Json(lobby))
}

/// HTTP handler for listing lobbies
///
/// GET /lobby?page=&per_page=
#[instrument(name = "list_lobbies", skip(state))]
pub async fn list_lobbies(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<LobbyModel>>, AppError> {
    let lobbies = state.lobby_service.list_lobbies(&page).await?;
    info!(lobby_count = lobbies.len(), "Lobbies listed successfully");
    Ok(Json(lobbies))
}

/// GET /lobby/{id}
#[instrument(name = "get_lobby", skip(state))]
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<LobbyModel>, AppError> {
    Ok(Json(state.lobby_service.get_lobby(&lobby_id).await?))
}

/// DELETE /lobby/{id}
#[instrument(name = "delete_lobby", skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_lobby(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(lobby_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .lobby_service
        .delete_lobby(&user.user_id, &lobby_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// HTTP handler for promoting a lobby into a game
///
/// POST /lobby/{id}/start
/// The roster is whoever is connected to the lobby channel right now.
#[instrument(name = "start_lobby_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn start_lobby_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(lobby_id): Path<String>,
) -> Result<Json<StartGameResponse>, AppError> {
    let game = state.lobby_live.start_game(&user.user_id, &lobby_id).await?;
    Ok(Json(StartGameResponse { game_id: game.id }))
}
