//! WebSocket transport built on `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use mira_common::error::TransportError;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Transport, TransportSession};

/// Dials the event stream over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    type Session = WebSocketSession;

    async fn connect(&self, url: &str) -> Result<WebSocketSession, TransportError> {
        tracing::debug!(url, "dialing event stream");
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(WebSocketSession {
            stream,
            closed: false,
            last_seen: Instant::now(),
        })
    }
}

/// A live WebSocket session.
#[derive(Debug)]
pub struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
    last_seen: Instant,
}

impl TransportSession for WebSocketSession {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        loop {
            let message = self.stream.next().await;
            if matches!(message, Some(Ok(_))) {
                self.last_seen = Instant::now();
            }
            match message {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "peer closed event stream");
                    self.closed = true;
                    return Ok(None);
                }
                // Pings are answered by tungstenite; binary frames are not part
                // of the protocol.
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(map_error(e));
                }
                None => {
                    self.closed = true;
                    return Err(TransportError::AbruptClose {
                        message: "stream ended without close frame".to_string(),
                    });
                }
            }
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::AbruptClose {
                message: "session already closed".to_string(),
            });
        }
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(map_error)
    }

    fn last_seen(&self) -> Instant {
        self.last_seen
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing event stream");
        }
    }
}

fn map_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::AbruptClose {
            message: error.to_string(),
        },
        WsError::Io(e) => TransportError::AbruptClose {
            message: e.to_string(),
        },
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::AbruptClose {
                message: error.to_string(),
            }
        }
        other => TransportError::Protocol {
            message: other.to_string(),
        },
    }
}
