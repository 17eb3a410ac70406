// Public API - what other modules can use
pub use handlers::{create_lobby, delete_lobby, get_lobby, list_lobbies, start_lobby_game};
pub use models::{LobbyError, LobbyModel};
pub use service::{LobbyService, LobbySettings};

mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;
