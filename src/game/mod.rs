// Public API - what other modules can use
pub use errors::GameError;
pub use multiplayer::{EndRoundOutcome, MultiplayerService};
pub use rounds::GameSettings;
pub(crate) use rounds::validate_parameters;
pub use singleplayer::SingleplayerService;

pub mod errors;
pub mod handlers;
pub mod models;
pub mod multiplayer;
pub mod postgres;
pub mod repository;
mod rounds;
pub mod singleplayer;
pub mod types;
