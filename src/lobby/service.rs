use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::models::{LobbyError, LobbyModel};
use super::repository::{JoinLobbyResult, LobbyRepository};
use super::types::CreateLobbyRequest;
use crate::clock::Clock;
use crate::game::models::{GameModel, GameParameters};
use crate::game::{self, MultiplayerService};
use crate::shared::{AppError, Pagination};

/// Lobby limits and expiration
#[derive(Debug, Clone, Copy)]
pub struct LobbySettings {
    /// How long an empty lobby survives
    pub idle_expiration: Duration,
    pub max_players_limit: i32,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            idle_expiration: Duration::from_secs(600),
            max_players_limit: 16,
        }
    }
}

/// Service for handling lobby business logic
pub struct LobbyService {
    repository: Arc<dyn LobbyRepository>,
    multiplayer: Arc<MultiplayerService>,
    clock: Arc<dyn Clock>,
    settings: LobbySettings,
}

impl LobbyService {
    pub fn new(
        repository: Arc<dyn LobbyRepository>,
        multiplayer: Arc<MultiplayerService>,
        clock: Arc<dyn Clock>,
        settings: LobbySettings,
    ) -> Self {
        Self {
            repository,
            multiplayer,
            clock,
            settings,
        }
    }

    /// Creates a lobby whose idle expiration is armed straight away
    #[instrument(skip(self, request))]
    pub async fn create_lobby(
        &self,
        creator_id: &str,
        request: CreateLobbyRequest,
    ) -> Result<LobbyModel, AppError> {
        let parameters = GameParameters::from(request.game);
        game::validate_parameters(&parameters, self.multiplayer.settings())?;

        if request.max_players < 2 || request.max_players > self.settings.max_players_limit {
            return Err(AppError::BadRequest(format!(
                "max_players must be between 2 and {}",
                self.settings.max_players_limit
            )));
        }

        let lobby = LobbyModel::new(creator_id, parameters, request.max_players, self.clock.now());
        self.repository
            .create_lobby(&lobby, self.settings.idle_expiration)
            .await?;

        info!(lobby_id = %lobby.id, creator_id = %creator_id, "Lobby created");
        Ok(lobby)
    }

    #[instrument(skip(self))]
    pub async fn get_lobby(&self, lobby_id: &str) -> Result<LobbyModel, AppError> {
        self.repository
            .get_lobby(lobby_id)
            .await?
            .ok_or_else(|| LobbyError::LobbyNotFound.into())
    }

    #[instrument(skip(self))]
    pub async fn list_lobbies(&self, page: &Pagination) -> Result<Vec<LobbyModel>, AppError> {
        page.validate()?;
        self.repository.list_lobbies(page).await
    }

    #[instrument(skip(self))]
    pub async fn delete_lobby(&self, user_id: &str, lobby_id: &str) -> Result<(), AppError> {
        let lobby = self.get_lobby(lobby_id).await?;
        if !lobby.is_created_by(user_id) {
            return Err(LobbyError::OnlyCreatorCanDelete.into());
        }

        self.repository.delete_lobby(lobby_id).await?;
        info!(lobby_id = %lobby_id, "Lobby deleted");
        Ok(())
    }

    /// Takes a seat in the lobby, which also stops it from expiring
    #[instrument(skip(self))]
    pub async fn connect(&self, lobby_id: &str) -> Result<LobbyModel, AppError> {
        match self.repository.try_join_lobby(lobby_id).await? {
            JoinLobbyResult::Success(lobby) => {
                debug!(lobby_id = %lobby_id, current_players = lobby.current_players, "Seat taken");
                Ok(lobby)
            }
            JoinLobbyResult::LobbyFull => Err(LobbyError::LobbyFull.into()),
            JoinLobbyResult::LobbyNotFound => Err(LobbyError::LobbyNotFound.into()),
        }
    }

    /// Frees a seat, re-arming the idle expiration when the lobby becomes empty
    #[instrument(skip(self))]
    pub async fn disconnect(&self, lobby_id: &str) -> Result<(), AppError> {
        match self.repository.decrement_players(lobby_id).await? {
            Some(1) => {
                self.repository
                    .expire(lobby_id, self.settings.idle_expiration)
                    .await?;
                debug!(lobby_id = %lobby_id, "Lobby is empty, idle expiration armed");
            }
            Some(previous) => {
                debug!(lobby_id = %lobby_id, remaining = previous - 1, "Seat freed");
            }
            None => {
                // Already promoted or expired
                debug!(lobby_id = %lobby_id, "Lobby gone before disconnect");
            }
        }
        Ok(())
    }

    /// Turns the lobby into a multiplayer game for the given roster
    ///
    /// Round 1 is opened on behalf of the creator and the lobby is removed.
    /// When the game cannot be created the lobby is put back as it was.
    #[instrument(skip(self))]
    pub async fn start_game(
        &self,
        user_id: &str,
        lobby_id: &str,
        roster: Vec<String>,
    ) -> Result<GameModel, AppError> {
        let lobby = self.get_lobby(lobby_id).await?;
        if !lobby.is_created_by(user_id) {
            warn!(lobby_id = %lobby_id, user_id = %user_id, "Non-creator tried to start the game");
            return Err(LobbyError::OnlyCreatorCanStart.into());
        }

        // Only one of two racing starts gets the lobby out of the store
        let Some(lobby) = self.repository.delete_lobby(lobby_id).await? else {
            return Err(LobbyError::LobbyNotFound.into());
        };

        let game = match self
            .multiplayer
            .start_game(&lobby.creator_id, lobby.parameters, roster)
            .await
        {
            Ok((game, _)) => game,
            Err(e) => {
                warn!(lobby_id = %lobby_id, error = %e, "Game creation failed, restoring lobby");
                if let Err(restore_err) = self
                    .repository
                    .restore_lobby(&lobby, self.settings.idle_expiration)
                    .await
                {
                    error!(lobby_id = %lobby_id, error = %restore_err, "Failed to restore lobby");
                }
                return Err(e);
            }
        };

        info!(lobby_id = %lobby_id, game_id = game.id, "Lobby promoted to game");
        Ok(game)
    }

    /// Drops expired lobbies from the store
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        self.repository.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::game::repository::{GameStore, InMemoryGameStore};
    use crate::game::types::CreateGameRequest;
    use crate::game::GameSettings;
    use crate::lobby::repository::InMemoryLobbyRepository;
    use crate::panorama::{InMemoryPanoramaCatalog, PanoramaPoint};
    use crate::scoring::Provider;

    fn service_with(settings: LobbySettings) -> (LobbyService, Arc<InMemoryLobbyRepository>) {
        let (service, repository, _) =
            service_with_catalog(settings, InMemoryPanoramaCatalog::with_default_points());
        (service, repository)
    }

    fn service_with_catalog(
        settings: LobbySettings,
        catalog: InMemoryPanoramaCatalog,
    ) -> (LobbyService, Arc<InMemoryLobbyRepository>, InMemoryGameStore) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = InMemoryGameStore::new();
        let multiplayer = Arc::new(MultiplayerService::new(
            Arc::new(store.clone()),
            Arc::new(catalog),
            Arc::clone(&clock),
            GameSettings::default(),
        ));
        let repository = Arc::new(InMemoryLobbyRepository::new());
        let service = LobbyService::new(repository.clone(), multiplayer, clock, settings);
        (service, repository, store)
    }

    fn request(max_players: i32) -> CreateLobbyRequest {
        request_for(Provider::Google, max_players)
    }

    fn request_for(provider: Provider, max_players: i32) -> CreateLobbyRequest {
        CreateLobbyRequest {
            game: CreateGameRequest {
                rounds: 3,
                timer_seconds: 30,
                moving_allowed: true,
                provider,
            },
            max_players,
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_when_full() {
        let (service, _) = service_with(LobbySettings::default());
        let lobby = service.create_lobby("alice", request(2)).await.unwrap();

        service.connect(&lobby.id).await.unwrap();
        service.connect(&lobby.id).await.unwrap();
        let third = service.connect(&lobby.id).await;

        assert!(matches!(third, Err(AppError::Lobby(LobbyError::LobbyFull))));
    }

    #[tokio::test]
    async fn test_last_disconnect_rearms_expiration() {
        let (service, repository) = service_with(LobbySettings::default());
        let lobby = service.create_lobby("alice", request(4)).await.unwrap();
        assert!(repository.has_expiration(&lobby.id));

        service.connect(&lobby.id).await.unwrap();
        service.connect(&lobby.id).await.unwrap();
        assert!(!repository.has_expiration(&lobby.id));

        service.disconnect(&lobby.id).await.unwrap();
        assert!(!repository.has_expiration(&lobby.id));

        service.disconnect(&lobby.id).await.unwrap();
        assert!(repository.has_expiration(&lobby.id));
    }

    #[tokio::test]
    async fn test_only_creator_can_start_or_delete() {
        let (service, _) = service_with(LobbySettings::default());
        let lobby = service.create_lobby("alice", request(4)).await.unwrap();

        let start = service
            .start_game("bob", &lobby.id, vec!["alice".to_string(), "bob".to_string()])
            .await;
        assert!(matches!(start, Err(AppError::Lobby(LobbyError::OnlyCreatorCanStart))));

        let delete = service.delete_lobby("bob", &lobby.id).await;
        assert!(matches!(delete, Err(AppError::Lobby(LobbyError::OnlyCreatorCanDelete))));

        service.delete_lobby("alice", &lobby.id).await.unwrap();
        let gone = service.get_lobby(&lobby.id).await;
        assert!(matches!(gone, Err(AppError::Lobby(LobbyError::LobbyNotFound))));
    }

    #[tokio::test]
    async fn test_start_game_promotes_lobby() {
        let (service, _) = service_with(LobbySettings::default());
        let lobby = service.create_lobby("alice", request(4)).await.unwrap();

        let game = service
            .start_game("alice", &lobby.id, vec!["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();

        assert_eq!(game.player_count, Some(2));
        assert_eq!(game.rounds, 3);
        assert!(service.get_lobby(&lobby.id).await.is_err());

        let again = service
            .start_game("alice", &lobby.id, vec!["alice".to_string()])
            .await;
        assert!(matches!(again, Err(AppError::Lobby(LobbyError::LobbyNotFound))));
    }

    #[tokio::test]
    async fn test_failed_start_puts_lobby_back() {
        let catalog = InMemoryPanoramaCatalog::new().with_provider_points(
            Provider::Google,
            vec![PanoramaPoint::new("lisbon", "ref", 38.7223, -9.1393)],
        );
        let (service, repository, store) =
            service_with_catalog(LobbySettings::default(), catalog);
        let lobby = service
            .create_lobby("alice", request_for(Provider::Kartaview, 4))
            .await
            .unwrap();
        service.connect(&lobby.id).await.unwrap();
        service.connect(&lobby.id).await.unwrap();

        let start = service
            .start_game("alice", &lobby.id, vec!["alice".to_string(), "bob".to_string()])
            .await;
        assert!(matches!(start, Err(AppError::NotFound(_))));

        let restored = service.get_lobby(&lobby.id).await.unwrap();
        assert_eq!(restored.current_players, 2);
        assert!(!repository.has_expiration(&lobby.id));
        assert_eq!(store.get_game(1).await.unwrap(), None);

        // Seats keep counting against the restored lobby
        service.disconnect(&lobby.id).await.unwrap();
        service.disconnect(&lobby.id).await.unwrap();
        assert!(repository.has_expiration(&lobby.id));
    }

    #[tokio::test]
    async fn test_create_validates_capacity() {
        let (service, _) = service_with(LobbySettings {
            max_players_limit: 4,
            ..LobbySettings::default()
        });

        let too_many = service.create_lobby("alice", request(5)).await;
        assert!(matches!(too_many, Err(AppError::BadRequest(_))));

        let too_few = service.create_lobby("alice", request(1)).await;
        assert!(matches!(too_few, Err(AppError::BadRequest(_))));
    }
}
