use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::game::GameSettings;
use crate::lobby::LobbySettings;

/// Runtime configuration read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Postgres connection string, the in-memory game store is used when unset
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub session_expiration_days: i64,
    pub lobby_idle_expiration_secs: u64,
    pub round_start_delay_secs: i64,
    pub round_end_delay_secs: i64,
    pub cleanup_interval_secs: u64,
    pub oauth_state_ttl_secs: u64,
    pub lobby_max_players_limit: i32,
    pub max_rounds_limit: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            jwt_secret: "your-secret-key-change-in-production".to_string(),
            session_expiration_days: 365,
            lobby_idle_expiration_secs: 600,
            round_start_delay_secs: 2,
            round_end_delay_secs: 5,
            cleanup_interval_secs: 60,
            oauth_state_ttl_secs: 600,
            lobby_max_players_limit: 16,
            max_rounds_limit: 20,
        }
    }
}

/// Reads and parses a variable, falling back to the default when absent or malformed
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, "Unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET is not set, using the development secret");
            defaults.jwt_secret.clone()
        });

        Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret,
            session_expiration_days: env_or(
                "SESSION_EXPIRATION_DAYS",
                defaults.session_expiration_days,
            ),
            lobby_idle_expiration_secs: env_or(
                "LOBBY_IDLE_EXPIRATION_SECS",
                defaults.lobby_idle_expiration_secs,
            ),
            round_start_delay_secs: env_or("ROUND_START_DELAY_SECS", defaults.round_start_delay_secs),
            round_end_delay_secs: env_or("ROUND_END_DELAY_SECS", defaults.round_end_delay_secs),
            cleanup_interval_secs: env_or("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs),
            oauth_state_ttl_secs: env_or("OAUTH_STATE_TTL_SECS", defaults.oauth_state_ttl_secs),
            lobby_max_players_limit: env_or(
                "LOBBY_MAX_PLAYERS_LIMIT",
                defaults.lobby_max_players_limit,
            ),
            max_rounds_limit: env_or("MAX_ROUNDS_LIMIT", defaults.max_rounds_limit),
        }
    }

    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            round_start_delay: chrono::Duration::seconds(self.round_start_delay_secs),
            round_end_delay: chrono::Duration::seconds(self.round_end_delay_secs),
            max_rounds: self.max_rounds_limit,
        }
    }

    pub fn lobby_settings(&self) -> LobbySettings {
        LobbySettings {
            idle_expiration: Duration::from_secs(self.lobby_idle_expiration_secs),
            max_players_limit: self.lobby_max_players_limit,
        }
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_state_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
