#![allow(dead_code)] // Test utilities may not all be used in every test

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use geoguess::{
    game::{models::GameParameters, repository::InMemoryGameStore},
    lobby::{repository::InMemoryLobbyRepository, LobbySettings},
    panorama::{InMemoryPanoramaCatalog, PanoramaPoint},
    scoring::Provider,
    session::UserIdentity,
    AppConfig, AppState, AppStateBuilder, InMemoryConnectionManager, ManualClock,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub game_store: Arc<InMemoryGameStore>,
    pub lobby_repository: Arc<InMemoryLobbyRepository>,
    pub connection_manager: Arc<InMemoryConnectionManager>,
}

pub struct TestSetupBuilder {
    config: AppConfig,
    lobby_idle_expiration: Option<Duration>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig {
                // Rounds are playable the moment they are created
                round_start_delay_secs: 0,
                round_end_delay_secs: 5,
                ..AppConfig::default()
            },
            lobby_idle_expiration: None,
        }
    }

    pub fn with_lobby_idle_expiration(mut self, expiration: Duration) -> Self {
        self.lobby_idle_expiration = Some(expiration);
        self
    }

    pub fn with_round_end_delay_secs(mut self, secs: i64) -> Self {
        self.config.round_end_delay_secs = secs;
        self
    }

    pub fn build(self) -> TestSetup {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let game_store = Arc::new(InMemoryGameStore::new());
        let lobby_repository = Arc::new(InMemoryLobbyRepository::new());
        let connection_manager = Arc::new(InMemoryConnectionManager::new());

        let catalog = InMemoryPanoramaCatalog::with_points(vec![
            PanoramaPoint::new("paris", "ref-paris", 48.8584, 2.2945),
            PanoramaPoint::new("lima", "ref-lima", -12.0464, -77.0428),
            PanoramaPoint::new("oslo", "ref-oslo", 59.9139, 10.7522),
        ]);

        let mut builder = AppStateBuilder::new()
            .with_config(self.config.clone())
            .with_clock(clock.clone())
            .with_game_store(game_store.clone())
            .with_catalog(Arc::new(catalog))
            .with_lobby_repository(lobby_repository.clone())
            .with_connection_manager(connection_manager.clone());

        if let Some(idle_expiration) = self.lobby_idle_expiration {
            builder = builder.with_lobby_settings(LobbySettings {
                idle_expiration,
                max_players_limit: self.config.lobby_max_players_limit,
            });
        }

        TestSetup {
            state: builder.build(),
            clock,
            game_store,
            lobby_repository,
            connection_manager,
        }
    }
}

impl TestSetup {
    /// Moves the game clock forward
    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

pub fn identity(user_id: &str) -> UserIdentity {
    UserIdentity {
        user_id: user_id.to_string(),
        username: format!("{user_id}-name"),
        display_name: user_id.to_string(),
    }
}

pub fn parameters(rounds: i32, timer_seconds: i32) -> GameParameters {
    GameParameters {
        rounds,
        timer_seconds,
        moving_allowed: true,
        provider: Provider::Google,
    }
}
