use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::game::handlers::{
    create_singleplayer_game, end_multiplayer_game, end_multiplayer_round, end_singleplayer_game,
    get_multiplayer_game, get_multiplayer_round, get_singleplayer_game, get_singleplayer_round,
    list_multiplayer_games, list_multiplayer_rounds, list_singleplayer_games,
    list_singleplayer_rounds, new_multiplayer_round, new_singleplayer_round,
    submit_multiplayer_guess, submit_singleplayer_guess,
};
use crate::lobby::{create_lobby, delete_lobby, get_lobby, list_lobbies, start_lobby_game};
use crate::session::{self, create_session, current_session, revoke_session};
use crate::shared::AppState;
use crate::websockets::{game_websocket_handler, lobby_websocket_handler};

/// Builds the full HTTP surface
///
/// Everything except session creation and the live channels sits behind the
/// bearer token middleware. Live channels authenticate during the upgrade.
pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route(
            "/singleplayer",
            post(create_singleplayer_game).get(list_singleplayer_games),
        )
        .route("/singleplayer/:id", get(get_singleplayer_game))
        .route(
            "/singleplayer/:id/round",
            post(new_singleplayer_round).get(get_singleplayer_round),
        )
        .route("/singleplayer/:id/guess", post(submit_singleplayer_guess))
        .route("/singleplayer/:id/rounds", get(list_singleplayer_rounds))
        .route("/singleplayer/:id/end", post(end_singleplayer_game))
        .route("/multiplayer", get(list_multiplayer_games))
        .route("/multiplayer/:id", get(get_multiplayer_game))
        .route(
            "/multiplayer/:id/round",
            post(new_multiplayer_round).get(get_multiplayer_round),
        )
        .route("/multiplayer/:id/guess", post(submit_multiplayer_guess))
        .route("/multiplayer/:id/round/end", post(end_multiplayer_round))
        .route("/multiplayer/:id/rounds", get(list_multiplayer_rounds))
        .route("/multiplayer/:id/end", post(end_multiplayer_game))
        .route("/lobby", post(create_lobby).get(list_lobbies))
        .route("/lobby/:id", get(get_lobby).delete(delete_lobby))
        .route("/lobby/:id/start", post(start_lobby_game))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::jwt_auth,
        ));

    // Only session creation is open, its other methods need the token
    let session_routes = post(create_session).merge(
        get(current_session)
            .delete(revoke_session)
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                session::jwt_auth,
            )),
    );

    Router::new()
        .route("/session", session_routes)
        .route("/ws/lobby/:id", get(lobby_websocket_handler))
        .route("/ws/game/:id", get(game_websocket_handler))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
