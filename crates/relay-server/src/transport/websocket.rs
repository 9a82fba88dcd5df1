//! WebSocket listener using tokio-tungstenite.
//!
//! Accepts plain WebSocket connections and exposes them as a stream of
//! accepted connections. Text frames carry JSON events, binary frames CBOR.

use futures_util::{SinkExt, StreamExt};
use relay_core::{Frame, RelayError, RelayResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Maximum size of a single inbound event frame (64 KiB).
pub const MAX_WS_FRAME_SIZE: usize = 64 * 1024;

/// Handshake configuration for accepted connections. The size limits are
/// enforced by tungstenite while reading, before a frame is buffered whole.
pub fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_WS_FRAME_SIZE);
    config.max_frame_size = Some(MAX_WS_FRAME_SIZE);
    config
}

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful with port 0) and a receiver that yields
/// accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> RelayResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| RelayError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let accepted =
                            tokio_tungstenite::accept_async_with_config(stream, Some(ws_config()))
                                .await;
                        match accepted {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
            if tx.is_closed() {
                debug!("no more consumers, stopping listener");
                break;
            }
        }
    });

    Ok((local_addr, rx))
}

/// Send one encoded event.
pub async fn ws_send_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    frame: Frame,
) -> RelayResult<()> {
    let msg = match frame {
        Frame::Text(s) => Message::Text(s.into()),
        Frame::Binary(b) => Message::Binary(b.into()),
    };
    ws.send(msg)
        .await
        .map_err(|e| RelayError::Transport(format!("WS send failed: {e}")))
}

/// Receive the next event frame.
///
/// Returns `None` once the peer closes. Pings are answered inline. A message
/// over [`MAX_WS_FRAME_SIZE`] surfaces as a transport error (see [`ws_config`]).
pub async fn ws_recv_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> RelayResult<Option<Frame>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text.to_string()))),
            Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data.to_vec()))),
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(RelayError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_connections_cap_inbound_size() {
        let config = ws_config();
        assert_eq!(config.max_message_size, Some(MAX_WS_FRAME_SIZE));
        assert_eq!(config.max_frame_size, Some(MAX_WS_FRAME_SIZE));
    }
}
