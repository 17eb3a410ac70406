use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::game::errors::GameError;
use crate::game::multiplayer::MultiplayerService;
use crate::game::repository::{GameStore, InMemoryGameStore};
use crate::game::singleplayer::SingleplayerService;
use crate::lobby::models::LobbyError;
use crate::lobby::repository::{InMemoryLobbyRepository, LobbyRepository};
use crate::lobby::service::{LobbyService, LobbySettings};
use crate::panorama::{InMemoryPanoramaCatalog, PanoramaCatalog};
use crate::session::repository::{InMemorySessionRepository, SessionRepository};
use crate::session::service::SessionService;
use crate::session::token::TokenConfig;
use crate::websockets::{ConnectionManager, GameLiveHandler, InMemoryConnectionManager, LobbyLiveHandler};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub session_service: Arc<SessionService>,
    pub singleplayer: Arc<SingleplayerService>,
    pub multiplayer: Arc<MultiplayerService>,
    pub lobby_service: Arc<LobbyService>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub lobby_live: Arc<LobbyLiveHandler>,
    pub game_live: Arc<GameLiveHandler>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Game(err) => match err {
                GameError::GameNotFound | GameError::RoundNotFound => StatusCode::NOT_FOUND,
                GameError::WrongUser | GameError::WrongMembership => StatusCode::FORBIDDEN,
                GameError::GameStillActive
                | GameError::RoundStillActive
                | GameError::RoundAlreadyFinished
                | GameError::RoundMaxAmount => StatusCode::CONFLICT,
            },
            AppError::Lobby(err) => match err {
                LobbyError::LobbyNotFound => StatusCode::NOT_FOUND,
                LobbyError::LobbyFull => StatusCode::CONFLICT,
                LobbyError::OnlyCreatorCanStart | LobbyError::OnlyCreatorCanDelete => {
                    StatusCode::FORBIDDEN
                }
            },
            AppError::JwtError(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            AppError::DatabaseError(msg) => {
                // Store detail stays in the logs
                error!(error = %msg, "Store operation failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// Query parameters for paginated listings, pages start at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(default_page(), DEFAULT_PER_PAGE)
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::BadRequest("page must be at least 1".to_string()));
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            return Err(AppError::BadRequest(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// Builder for wiring AppState, every dependency falls back to its in-memory version
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<AppConfig>,
    clock: Option<Arc<dyn Clock>>,
    game_store: Option<Arc<dyn GameStore>>,
    catalog: Option<Arc<dyn PanoramaCatalog>>,
    lobby_repository: Option<Arc<dyn LobbyRepository>>,
    session_repository: Option<Arc<dyn SessionRepository>>,
    connection_manager: Option<Arc<dyn ConnectionManager>>,
    lobby_settings: Option<LobbySettings>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_game_store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.game_store = Some(store);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PanoramaCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_lobby_repository(mut self, repo: Arc<dyn LobbyRepository>) -> Self {
        self.lobby_repository = Some(repo);
        self
    }

    pub fn with_session_repository(mut self, repo: Arc<dyn SessionRepository>) -> Self {
        self.session_repository = Some(repo);
        self
    }

    pub fn with_connection_manager(mut self, manager: Arc<dyn ConnectionManager>) -> Self {
        self.connection_manager = Some(manager);
        self
    }

    /// Overrides the lobby settings derived from the config
    pub fn with_lobby_settings(mut self, settings: LobbySettings) -> Self {
        self.lobby_settings = Some(settings);
        self
    }

    pub fn build(self) -> AppState {
        let config = self.config.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let game_store = self
            .game_store
            .unwrap_or_else(|| Arc::new(InMemoryGameStore::new()));
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(InMemoryPanoramaCatalog::with_default_points()));
        let lobby_repository = self
            .lobby_repository
            .unwrap_or_else(|| Arc::new(InMemoryLobbyRepository::new()));
        let session_repository = self
            .session_repository
            .unwrap_or_else(|| Arc::new(InMemorySessionRepository::new()));
        let connection_manager = self
            .connection_manager
            .unwrap_or_else(|| Arc::new(InMemoryConnectionManager::new()));

        let singleplayer = Arc::new(SingleplayerService::new(
            Arc::clone(&game_store),
            Arc::clone(&catalog),
            Arc::clone(&clock),
            config.game_settings(),
        ));
        let multiplayer = Arc::new(MultiplayerService::new(
            Arc::clone(&game_store),
            Arc::clone(&catalog),
            Arc::clone(&clock),
            config.game_settings(),
        ));
        let lobby_service = Arc::new(LobbyService::new(
            lobby_repository,
            Arc::clone(&multiplayer),
            Arc::clone(&clock),
            self.lobby_settings.unwrap_or_else(|| config.lobby_settings()),
        ));
        let session_service = Arc::new(SessionService::new(
            session_repository,
            TokenConfig::from_config(&config),
            config.oauth_state_ttl(),
        ));

        let lobby_live = Arc::new(LobbyLiveHandler::new(
            Arc::clone(&lobby_service),
            Arc::clone(&connection_manager),
        ));
        let game_live = Arc::new(GameLiveHandler::new(
            Arc::clone(&multiplayer),
            Arc::clone(&connection_manager),
        ));
        connection_manager.register_listener(lobby_live.clone());
        connection_manager.register_listener(game_live.clone());

        AppState {
            config: Arc::new(config),
            session_service,
            singleplayer,
            multiplayer,
            lobby_service,
            connection_manager,
            lobby_live,
            game_live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        assert!(Pagination::default().validate().is_ok());
        assert!(Pagination::new(0, 10).validate().is_err());
        assert!(Pagination::new(1, 0).validate().is_err());
        assert!(Pagination::new(1, 101).validate().is_err());

        let page = Pagination::new(3, 25);
        assert_eq!(page.offset(), 50);
        assert_eq!(page.limit(), 25);
    }

    #[test]
    fn test_domain_errors_map_to_status_codes() {
        assert_eq!(
            AppError::from(GameError::RoundStillActive).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(GameError::WrongMembership).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(LobbyError::LobbyNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LobbyError::LobbyFull).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::DatabaseError("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_database_error_body_hides_detail() {
        let response = AppError::DatabaseError("relation games does not exist".to_string())
            .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("Internal server error"));
        assert!(!text.contains("relation"));
    }
}
