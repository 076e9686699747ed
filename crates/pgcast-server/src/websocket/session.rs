//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use pgcast_core::{RelayError, ServerFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, ConnectionEvent};
use super::registry::ConnectionRegistry;
use super::router::{route_binary, route_text};
use crate::config::ServerConfig;

/// Why the writer task stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterExit {
    /// The socket rejected a write.
    SendFailed,
    /// The outbound queue was closed.
    QueueClosed,
    /// No client activity within the heartbeat timeout.
    TimedOut,
    /// Close requested by the server; a Close frame was sent.
    CloseRequested,
}

/// Queue the `client_id` and `subscribe` handshake frames.
pub fn send_handshake(conn: &ClientConnection, channel: &str) -> Result<(), RelayError> {
    conn.send_frame(&ServerFrame::client_id(&conn.id))?;
    conn.send_frame(&ServerFrame::subscribe(channel))
}

/// Register a new client and queue its handshake. Returns the `Open`
/// connection, or `None` once the failed entry has been removed.
pub fn accept(registry: &ConnectionRegistry, tx: mpsc::Sender<Arc<str>>) -> Option<Arc<ClientConnection>> {
    let connection = registry.register(tx);
    complete_handshake(registry, &connection).then_some(connection)
}

/// `Connecting -> Open` once both handshake frames are queued. On failure
/// the connection goes straight to `Closed` and is removed.
pub fn complete_handshake(registry: &ConnectionRegistry, connection: &ClientConnection) -> bool {
    let client_id = &connection.id;
    if let Err(e) = send_handshake(connection, registry.default_channel()) {
        warn!(client_id = %client_id, error = %e, kind = e.error_kind(), "handshake failed");
        let _ = connection.apply(ConnectionEvent::HandshakeFailed);
        let _ = registry.remove(client_id);
        return false;
    }
    if !registry.mark_open(client_id) {
        debug!(client_id = %client_id, "connection closed before handshake completed");
        let _ = registry.remove(client_id);
        return false;
    }
    info!(client_id = %client_id, "client connected");
    true
}

/// Run one client session.
///
/// 1. [`accept`]: the connection only becomes `Open` once both handshake
///    frames are queued
/// 2. Spawn the writer: drains the queue, pings, enforces the timeout
/// 3. Route inbound frames until the client or the writer goes away
/// 4. Remove from the registry (idempotent)
#[instrument(skip_all)]
pub async fn run_ws_session(ws: WebSocket, registry: Arc<ConnectionRegistry>, config: Arc<ServerConfig>) {
    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(config.send_queue_capacity());
    let Some(connection) = accept(&registry, send_tx) else {
        return;
    };
    let client_id = connection.id.clone();
    let (ws_tx, mut ws_rx) = ws.split();

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        config.heartbeat_interval(),
        config.heartbeat_timeout(),
    ));

    let mut writer_exit = None;
    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, error = %e, "transport error");
                        break;
                    }
                    None => break,
                };
                connection.mark_alive();
                match msg {
                    Message::Text(text) => {
                        let _ = route_text(&registry, &client_id, text.as_str());
                    }
                    Message::Binary(data) => {
                        let _ = route_binary(&registry, &client_id, &data);
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        debug!(client_id = %client_id, "client sent close frame");
                        break;
                    }
                }
            }
            exit = &mut writer => {
                writer_exit = Some(exit.unwrap_or(WriterExit::SendFailed));
                break;
            }
        }
    }

    if writer_exit.is_none() {
        writer.abort();
    }
    let removed = registry.remove(&client_id);
    let closed = RelayError::TransportClosed {
        client_id: client_id.clone(),
    };
    info!(
        client_id = %client_id,
        removed,
        writer = ?writer_exit,
        dropped = connection.drop_count(),
        connected_secs = connection.connected_at.elapsed().as_secs(),
        kind = closed.error_kind(),
        "client disconnected"
    );
}

/// Forward queued frames to the socket with periodic Pings.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    conn: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) -> WriterExit {
    let mut ping = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else {
                    return WriterExit::QueueClosed;
                };
                if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                    return WriterExit::SendFailed;
                }
            }
            _ = ping.tick() => {
                if !conn.check_alive() && conn.last_seen_elapsed() > timeout {
                    warn!(client_id = %conn.id, "client unresponsive for {timeout:?}, disconnecting");
                    return WriterExit::TimedOut;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return WriterExit::SendFailed;
                }
            }
            () = conn.close_requested() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: Utf8Bytes::from_static("server shutting down"),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                return WriterExit::CloseRequested;
            }
        }
    }
}
