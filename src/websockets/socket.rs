use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::connection_manager::LiveSession;

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next message from the client (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;

    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for incoming live messages of one channel kind
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, session: &LiveSession, message: String);
}

#[derive(Debug)]
pub enum SocketError {
    SendFailed(String),
    ReceiveFailed(String),
}

#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // Binary/ping/pong
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// A managed live connection
///
/// Pumps messages queued by the ConnectionManager out to the client and hands
/// client messages to the channel's MessageHandler until either side hangs up.
pub struct Connection {
    session: LiveSession,
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::UnboundedReceiver<String>,
    message_handler: Arc<dyn MessageHandler>,
}

impl Connection {
    pub fn new(
        session: LiveSession,
        socket: Box<dyn SocketWrapper>,
        outbound_receiver: mpsc::UnboundedReceiver<String>,
        message_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            session,
            socket,
            outbound_receiver,
            message_handler,
        }
    }

    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                msg = self.outbound_receiver.recv() => {
                    match msg {
                        Some(message) => self.socket.send_message(message).await?,
                        None => break, // Channel closed, disconnect
                    }
                }

                msg = self.socket.receive_message() => {
                    match msg {
                        Ok(Some(message)) => {
                            self.message_handler
                                .handle_message(&self.session, message)
                                .await;
                        }
                        Ok(None) => break, // Client disconnected
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let _ = self.socket.close().await;
        Ok(())
    }
}
