use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use tracing::{info, instrument};

use super::models::{GameModel, GameSummary};
use super::types::{
    CreateGameRequest, GuessRequest, GuessResponse, RoundResponse, RoundResultResponse,
};
use crate::session::UserIdentity;
use crate::shared::{AppError, AppState, Pagination};

/// POST /singleplayer
#[instrument(name = "create_singleplayer_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn create_singleplayer_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(request): Json<CreateGameRequest>,
) -> Result<Json<GameModel>, AppError> {
    let game = state
        .singleplayer
        .create_game(&user.user_id, request.into())
        .await?;
    Ok(Json(game))
}

/// GET /singleplayer?page=&per_page=
#[instrument(name = "list_singleplayer_games", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_singleplayer_games(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<GameModel>>, AppError> {
    let games = state.singleplayer.list_games(&user.user_id, &page).await?;
    info!(count = games.len(), "Singleplayer games listed");
    Ok(Json(games))
}

/// GET /singleplayer/{id}
#[instrument(name = "get_singleplayer_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_singleplayer_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameModel>, AppError> {
    Ok(Json(state.singleplayer.get_game(&user.user_id, game_id).await?))
}

/// POST /singleplayer/{id}/round
#[instrument(name = "new_singleplayer_round", skip(state, user), fields(user_id = %user.user_id))]
pub async fn new_singleplayer_round(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<RoundResponse>, AppError> {
    let game = state.singleplayer.get_game(&user.user_id, game_id).await?;
    let round = state.singleplayer.new_round(&user.user_id, game_id).await?;
    Ok(Json(RoundResponse::new(round, game.timer_seconds)))
}

/// GET /singleplayer/{id}/round
#[instrument(name = "get_singleplayer_round", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_singleplayer_round(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<RoundResponse>, AppError> {
    let game = state.singleplayer.get_game(&user.user_id, game_id).await?;
    let round = state.singleplayer.current_round(&user.user_id, game_id).await?;
    Ok(Json(RoundResponse::new(round, game.timer_seconds)))
}

/// POST /singleplayer/{id}/guess
#[instrument(name = "submit_singleplayer_guess", skip(state, user), fields(user_id = %user.user_id))]
pub async fn submit_singleplayer_guess(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
    Json(request): Json<GuessRequest>,
) -> Result<Json<GuessResponse>, AppError> {
    let game = state.singleplayer.get_game(&user.user_id, game_id).await?;
    let submitted = state
        .singleplayer
        .submit_guess(&user.user_id, game_id, request.lat, request.lng)
        .await?;
    Ok(Json(GuessResponse::new(submitted, game.timer_seconds)))
}

/// GET /singleplayer/{id}/rounds
#[instrument(name = "list_singleplayer_rounds", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_singleplayer_rounds(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<Vec<RoundResultResponse>>, AppError> {
    let game = state.singleplayer.get_game(&user.user_id, game_id).await?;
    let rounds = state
        .singleplayer
        .finished_rounds(&user.user_id, game_id)
        .await?;
    Ok(Json(
        rounds
            .into_iter()
            .map(|r| RoundResultResponse::new(r, game.timer_seconds))
            .collect(),
    ))
}

/// POST /singleplayer/{id}/end
#[instrument(name = "end_singleplayer_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn end_singleplayer_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(state.singleplayer.end_game(&user.user_id, game_id).await?))
}

/// GET /multiplayer?page=&per_page=
#[instrument(name = "list_multiplayer_games", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_multiplayer_games(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<GameModel>>, AppError> {
    let games = state.multiplayer.list_games(&user.user_id, &page).await?;
    info!(count = games.len(), "Multiplayer games listed");
    Ok(Json(games))
}

/// GET /multiplayer/{id}
#[instrument(name = "get_multiplayer_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_multiplayer_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameModel>, AppError> {
    Ok(Json(state.multiplayer.get_game(&user.user_id, game_id).await?))
}

/// POST /multiplayer/{id}/round
#[instrument(name = "new_multiplayer_round", skip(state, user), fields(user_id = %user.user_id))]
pub async fn new_multiplayer_round(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<RoundResponse>, AppError> {
    let game = state.multiplayer.get_game(&user.user_id, game_id).await?;
    let round = state.multiplayer.new_round(&user.user_id, game_id).await?;
    Ok(Json(RoundResponse::new(round, game.timer_seconds)))
}

/// GET /multiplayer/{id}/round
#[instrument(name = "get_multiplayer_round", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_multiplayer_round(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<RoundResponse>, AppError> {
    let game = state.multiplayer.get_game(&user.user_id, game_id).await?;
    let round = state.multiplayer.current_round(&user.user_id, game_id).await?;
    Ok(Json(RoundResponse::new(round, game.timer_seconds)))
}

/// POST /multiplayer/{id}/guess
#[instrument(name = "submit_multiplayer_guess", skip(state, user), fields(user_id = %user.user_id))]
pub async fn submit_multiplayer_guess(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
    Json(request): Json<GuessRequest>,
) -> Result<Json<GuessResponse>, AppError> {
    let game = state.multiplayer.get_game(&user.user_id, game_id).await?;
    let submitted = state
        .multiplayer
        .submit_guess(&user.user_id, game_id, request.lat, request.lng)
        .await?;
    Ok(Json(GuessResponse::new(submitted, game.timer_seconds)))
}

/// POST /multiplayer/{id}/round/end
///
/// A round that cannot close yet is reported as a conflict for the caller to retry.
#[instrument(name = "end_multiplayer_round", skip(state, user), fields(user_id = %user.user_id))]
pub async fn end_multiplayer_round(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<RoundResultResponse>, AppError> {
    let game = state.multiplayer.get_game(&user.user_id, game_id).await?;
    let result = state
        .multiplayer
        .end_round(&user.user_id, game_id)
        .await?
        .into_result()?;
    Ok(Json(RoundResultResponse::new(result, game.timer_seconds)))
}

/// GET /multiplayer/{id}/rounds
#[instrument(name = "list_multiplayer_rounds", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_multiplayer_rounds(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<Vec<RoundResultResponse>>, AppError> {
    let game = state.multiplayer.get_game(&user.user_id, game_id).await?;
    let rounds = state
        .multiplayer
        .finished_rounds(&user.user_id, game_id)
        .await?;
    Ok(Json(
        rounds
            .into_iter()
            .map(|r| RoundResultResponse::new(r, game.timer_seconds))
            .collect(),
    ))
}

/// POST /multiplayer/{id}/end
#[instrument(name = "end_multiplayer_game", skip(state, user), fields(user_id = %user.user_id))]
pub async fn end_multiplayer_game(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(state.multiplayer.end_game(&user.user_id, game_id).await?))
}
