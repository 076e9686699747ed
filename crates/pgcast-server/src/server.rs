//! `RelayServer`: axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<ServerConfig>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub upstream_channel: Arc<str>,
}

/// Owns the registry, broadcaster, and shutdown signal for one relay.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl RelayServer {
    /// `upstream_channel` is the one notification channel forwarded to
    /// clients.
    pub fn new(config: ServerConfig, upstream_channel: impl Into<String>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.default_channel.as_str()));
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), upstream_channel));
        Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// The `WebSocket` upgrade is served on `/` and `/ws`.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            upstream_channel: Arc::from(self.broadcaster.channel()),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in a background task until shutdown.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, channel = self.broadcaster.channel(), "relay server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server terminated with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Ask every open connection to close. Returns how many were signalled.
    pub fn close_connections(&self) -> usize {
        let count = self.registry.close_all();
        info!(count, "closing client connections");
        count
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET / and GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let AppState {
        registry, config, ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, registry, config))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.open_count(),
        &state.upstream_channel,
    ))
}
