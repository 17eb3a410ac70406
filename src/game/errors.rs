use thiserror::Error;

/// Domain failures of the round state machines
///
/// `GameStillActive` and `RoundStillActive` are expected in live play: the
/// caller is early and should retry once the timer or quorum is reached.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    #[error("Game does not exist")]
    GameNotFound,

    #[error("Round does not exist")]
    RoundNotFound,

    #[error("Game belongs to another user")]
    WrongUser,

    #[error("User is not a player of this game")]
    WrongMembership,

    #[error("Game still has rounds to play")]
    GameStillActive,

    #[error("Round is still active")]
    RoundStillActive,

    #[error("Round is already finished")]
    RoundAlreadyFinished,

    #[error("All rounds of this game have been played")]
    RoundMaxAmount,
}

impl GameError {
    /// Whether the caller may retry the same request later and succeed
    pub fn is_still_active(&self) -> bool {
        matches!(self, GameError::GameStillActive | GameError::RoundStillActive)
    }
}
