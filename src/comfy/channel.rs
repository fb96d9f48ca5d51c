//! The WebSocket push channel.

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::ComfyError;
use super::messages::{ServerMessage, parse_message};

/// A source of server events for one client id.
#[allow(async_fn_in_trait)]
pub trait EventChannel {
    /// Next understood event; `Ok(None)` once the channel is closed.
    async fn next_event(&mut self) -> Result<Option<ServerMessage>, ComfyError>;
}

pub struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketChannel {
    /// Opens `/ws?clientId=...`. Open it before submitting so no event is missed.
    pub async fn connect(url: &str) -> Result<Self, ComfyError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ComfyError::Channel(format!("connect to {url} failed: {e}")))?;
        tracing::debug!(%url, "push channel connected");
        Ok(Self { stream })
    }
}

impl EventChannel for WebSocketChannel {
    async fn next_event(&mut self) -> Result<Option<ServerMessage>, ComfyError> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match parse_message(&text) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(e) => {
                        tracing::trace!(error = %e, raw_message = %text, "skipping unrecognised message");
                    }
                },
                // Preview images.
                Ok(Message::Binary(_)) => {}
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "push channel closed by server");
                    return Ok(None);
                }
                Err(e) => return Err(ComfyError::Channel(e.to_string())),
            }
        }
        Ok(None)
    }
}
