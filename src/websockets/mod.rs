// Public API
pub use connection_manager::{
    ConnectionManager, GroupId, InMemoryConnectionManager, LiveSession, SessionListener,
};
pub use game_live::GameLiveHandler;
pub use handler::{game_websocket_handler, lobby_websocket_handler};
pub use lobby_live::LobbyLiveHandler;
pub use messages::{ClientMessage, ServerMessage};
pub use socket::MessageHandler;

// Internal modules
mod connection_manager;
mod game_live;
mod handler;
mod lobby_live;
mod messages;
mod socket;
