//! WebSocket transport for the active-foreground path.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use beacon_core::error::{AppError, ErrorKind};
use beacon_core::result::AppResult;
use beacon_core::types::wire::{ClientMessage, ServerMessage};

/// One live socket to the server.
#[async_trait]
pub trait Socket: Send + std::fmt::Debug {
    /// Sends a JSON message.
    async fn send(&mut self, message: &ClientMessage) -> AppResult<()>;

    /// Next server message; `None` when the socket closed.
    async fn recv(&mut self) -> Option<ServerMessage>;

    /// Closes the socket cleanly.
    async fn close(&mut self);
}

/// Opens sockets; mocked in tests.
#[async_trait]
pub trait SocketConnector: Send + Sync + std::fmt::Debug {
    /// Dials the server.
    async fn connect(&self) -> AppResult<Box<dyn Socket>>;
}

/// tungstenite-backed connector.
#[derive(Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Creates a connector for `{ws_url}/ws/active-users`.
    pub fn new(ws_url: &str) -> Self {
        Self {
            url: format!("{}/ws/active-users", ws_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self) -> AppResult<Box<dyn Socket>> {
        let (stream, _) = connect_async(self.url.as_str()).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::ServiceUnavailable,
                format!("WebSocket connect failed: {e}"),
                e,
            )
        })?;
        Ok(Box::new(WsSocket { stream }))
    }
}

/// A connected tungstenite socket.
pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSocket").finish()
    }
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, message: &ClientMessage) -> AppResult<()> {
        let text = serde_json::to_string(message)?;
        self.stream.send(Message::Text(text)).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::ServiceUnavailable,
                format!("WebSocket send failed: {e}"),
                e,
            )
        })
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => {
                        debug!(error = %e, "Dropping unparseable server message");
                    }
                },
                // Native ping/pong is answered by the library on flush.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "WebSocket read error");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
