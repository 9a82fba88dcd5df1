//! Core server: accepts connections and runs one session loop per client.
//!
//! Owns the session handler (registry, router, directory) and coordinates
//! the lifecycle of every incoming connection.

use crate::config::ServerConfig;
use crate::directory::AccountDirectory;
use crate::relay::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::session::{Session, SessionHandler};
use crate::transport::websocket::{self, WebSocketConnection};
use relay_core::{decode_frame, encode_frame, ClientEvent, RelayResult, ServerEvent, WireFormat};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// The relay server instance.
pub struct RelayServer {
    config: ServerConfig,
    handler: Arc<SessionHandler>,
    next_conn_id: AtomicU64,
    /// Tells every session loop to close.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig, directory: Arc<dyn AccountDirectory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.admin_identity.clone()));
        let handler = Arc::new(SessionHandler::new(
            registry,
            directory,
            config.enforce_directory,
        ));

        Self {
            config,
            handler,
            next_conn_id: AtomicU64::new(1),
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    pub fn handler(&self) -> &Arc<SessionHandler> {
        &self.handler
    }

    /// Serve accepted connections until `shutdown` resolves or the listener
    /// goes away.
    pub async fn run(
        self,
        mut incoming: mpsc::Receiver<WebSocketConnection>,
        shutdown: impl Future<Output = ()>,
    ) -> RelayResult<()> {
        let server = Arc::new(self);
        tokio::pin!(shutdown);

        info!(
            admin = %server.config.admin_identity,
            enforce_directory = server.config.enforce_directory,
            "relay-server ready"
        );

        loop {
            tokio::select! {
                Some(conn) = incoming.recv() => {
                    let srv = server.clone();
                    tokio::spawn(async move {
                        let remote = conn.remote_addr;
                        if let Err(e) = srv.handle_websocket(conn).await {
                            warn!(remote = %remote, error = %e, "WebSocket connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                else => {
                    info!("listener closed, shutting down");
                    break;
                }
            }
        }

        info!("closing connected clients");
        let _ = server.shutdown_tx.send(());

        Ok(())
    }

    fn next_conn_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Drive one WebSocket connection from accept to disconnect.
    async fn handle_websocket(&self, mut conn: WebSocketConnection) -> RelayResult<()> {
        let conn_id = self.next_conn_id();
        info!(remote = %conn.remote_addr, conn_id, "client connected");

        let (tx, rx) = mpsc::channel::<ServerEvent>(self.config.outbound_queue);
        let mut session = self.handler.open(ConnectionHandle::new(conn_id, tx));

        let result = self.session_loop(&mut conn, &mut session, rx).await;

        // Runs on every exit path, including transport errors.
        session.disconnect().await;
        info!(remote = %conn.remote_addr, conn_id, "client disconnected");

        result
    }

    async fn session_loop(
        &self,
        conn: &mut WebSocketConnection,
        session: &mut Session,
        mut outbound: mpsc::Receiver<ServerEvent>,
    ) -> RelayResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // Replies follow whatever encoding the client last used.
        let mut format = WireFormat::default();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("shutdown signal received, closing WebSocket client");
                    let _ = conn.ws_stream.close(None).await;
                    break;
                }

                Some(event) = outbound.recv() => {
                    let frame = encode_frame(format, &event)?;
                    websocket::ws_send_frame(&mut conn.ws_stream, frame).await?;
                }

                ws_result = websocket::ws_recv_frame(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(frame)) => {
                            format = frame.format();
                            let reply = match decode_frame::<ClientEvent>(&frame) {
                                Ok(event) => session.handle_event(event).await.err(),
                                Err(e) => Some(e),
                            };
                            if let Some(e) = reply {
                                debug!(error = %e, "rejecting client event");
                                let err = ServerEvent::Error { reason: e.to_string() };
                                let frame = encode_frame(format, &err)?;
                                websocket::ws_send_frame(&mut conn.ws_stream, frame).await?;
                            }
                        }
                        Ok(None) => {
                            debug!("WebSocket session ended (peer closed)");
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "WebSocket session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
