// Library crate for the geoguess game server
// This file exposes the public API for the binary and integration tests

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod game;
pub mod lobby;
pub mod panorama;
pub mod routes;
pub mod scoring;
pub mod session;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use game::{EndRoundOutcome, GameError, MultiplayerService, SingleplayerService};
pub use lobby::{LobbyError, LobbyService};
pub use shared::{AppError, AppState, AppStateBuilder, Pagination};
pub use websockets::{ConnectionManager, GroupId, InMemoryConnectionManager, LiveSession};
