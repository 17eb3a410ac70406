#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::Value;
use tokio::sync::mpsc;

use geoguess::websockets::LiveSession;

/// Client end of a live session, reading what the server pushed to it
#[derive(Debug)]
pub struct LiveClient {
    pub session: LiveSession,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl LiveClient {
    pub fn new(session: LiveSession, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self { session, receiver }
    }

    pub fn user_id(&self) -> &str {
        &self.session.user.user_id
    }

    /// Next queued message, if any
    pub fn try_next(&mut self) -> Option<Value> {
        self.receiver
            .try_recv()
            .ok()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// Every queued message, oldest first
    pub fn drain(&mut self) -> Vec<Value> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
