//! Test assertion helpers - fluent API for verifying pushed messages
#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::Value;

use geoguess::{AppError, GameError, LobbyError};

use super::clients::LiveClient;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct LiveAssertion<'a> {
    clients: Vec<&'a mut LiveClient>,
}

impl<'a> LiveAssertion<'a> {
    pub fn for_clients(clients: Vec<&'a mut LiveClient>) -> Self {
        Self { clients }
    }

    pub fn for_client(client: &'a mut LiveClient) -> Self {
        Self {
            clients: vec![client],
        }
    }

    /// Every client's next message has the given type and the same payload
    pub fn received(self, expected_type: &str) -> Value {
        let mut payloads: Vec<Value> = Vec::new();

        for client in self.clients {
            let user_id = client.user_id().to_string();
            let message = client
                .try_next()
                .unwrap_or_else(|| panic!("{user_id} should have received {expected_type}"));
            assert_eq!(
                message["type"], expected_type,
                "{user_id} received wrong message type: {message}"
            );
            payloads.push(message["payload"].clone());
        }

        for payload in payloads.iter().skip(1) {
            assert_eq!(payload, &payloads[0], "Payloads differ between clients");
        }
        payloads.into_iter().next().unwrap_or(Value::Null)
    }

    pub fn received_nothing(self) {
        for client in self.clients {
            let user_id = client.user_id().to_string();
            let pending = client.drain();
            assert!(
                pending.is_empty(),
                "{user_id} should not have received anything, got {pending:?}"
            );
        }
    }
}

/// Asserts the error is the expected domain error
pub fn assert_app_error<T: std::fmt::Debug>(result: Result<T, AppError>, expected: &str) {
    let error = result.expect_err("expected an error");
    let matches = match (&error, expected) {
        (AppError::Game(GameError::GameNotFound), "game-not-found") => true,
        (AppError::Game(GameError::RoundNotFound), "round-not-found") => true,
        (AppError::Game(GameError::WrongUser), "wrong-user") => true,
        (AppError::Game(GameError::WrongMembership), "wrong-membership") => true,
        (AppError::Game(GameError::GameStillActive), "game-still-active") => true,
        (AppError::Game(GameError::RoundStillActive), "round-still-active") => true,
        (AppError::Game(GameError::RoundAlreadyFinished), "round-already-finished") => true,
        (AppError::Game(GameError::RoundMaxAmount), "round-max-amount") => true,
        (AppError::Lobby(LobbyError::LobbyNotFound), "lobby-not-found") => true,
        (AppError::Lobby(LobbyError::LobbyFull), "lobby-full") => true,
        (AppError::Lobby(LobbyError::OnlyCreatorCanStart), "only-creator-can-start") => true,
        (AppError::Lobby(LobbyError::OnlyCreatorCanDelete), "only-creator-can-delete") => true,
        (AppError::BadRequest(_), "bad-request") => true,
        _ => false,
    };
    assert!(matches, "expected {expected}, got {error:?}");
}
