//! `WebSocket` client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pgcast_core::{ClientId, RelayError, ServerFrame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Discrete inputs that drive [`ConnectionState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Both handshake frames were queued for send.
    HandshakeQueued,
    /// A handshake frame could not be queued.
    HandshakeFailed,
    /// The server asked the connection to close.
    CloseRequested,
    /// The transport closed or errored.
    Terminated,
}

impl ConnectionState {
    /// Pure transition function. `Closed` is absorbing.
    pub fn next(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent as E;
        use ConnectionState as S;
        match (self, event) {
            (S::Closed, _) | (_, E::Terminated | E::HandshakeFailed) => S::Closed,
            (S::Connecting, E::HandshakeQueued) => S::Open,
            (S::Connecting | S::Open, E::CloseRequested) => S::Closing,
            (state, _) => state,
        }
    }
}

/// One connected client.
///
/// Owned by the registry behind an `Arc`; the session and the broadcaster
/// hold clones only while they work with it.
pub struct ClientConnection {
    /// Server-assigned identity.
    pub id: ClientId,
    state: Mutex<ConnectionState>,
    subscribed_channel: Mutex<String>,
    /// Send channel to the client's writer task.
    tx: mpsc::Sender<Arc<str>>,
    close: CancellationToken,
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: ClientId, channel: impl Into<String>, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: Mutex::new(ConnectionState::Connecting),
            subscribed_channel: Mutex::new(channel.into()),
            tx,
            close: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Apply an event and return the resulting state.
    pub fn apply(&self, event: ConnectionEvent) -> ConnectionState {
        let mut state = self.state.lock();
        *state = state.next(event);
        *state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn subscribed_channel(&self) -> String {
        self.subscribed_channel.lock().clone()
    }

    pub fn set_subscription(&self, channel: impl Into<String>) {
        *self.subscribed_channel.lock() = channel.into();
    }

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter.
    pub fn send(&self, message: Arc<str>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and queue a handshake frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> Result<(), RelayError> {
        let json = frame.to_json().map_err(|e| RelayError::TransportSend {
            client_id: self.id.clone(),
            reason: e.to_string(),
        })?;
        if self.send(Arc::from(json)) {
            Ok(())
        } else {
            Err(RelayError::TransportSend {
                client_id: self.id.clone(),
                reason: "send queue full or closed".into(),
            })
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (any inbound frame, including Pong).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Ask the writer task to send a Close frame and stop.
    pub fn request_close(&self) {
        let _ = self.apply(ConnectionEvent::CloseRequested);
        self.close.cancel();
    }

    /// Resolves once a close was requested or the connection was removed.
    pub async fn close_requested(&self) {
        self.close.cancelled().await;
    }

    pub(crate) fn terminate(&self) {
        let _ = self.apply(ConnectionEvent::Terminated);
        self.close.cancel();
    }
}
