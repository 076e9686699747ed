//! # pgcast-server
//!
//! The relay core: accepts `WebSocket` clients and fans upstream
//! notifications out to every open connection.
//!
//! - [`websocket::registry::ConnectionRegistry`]: the one shared table of live connections
//! - [`websocket::session`]: per-client acceptor, handshake, reader and writer
//! - [`websocket::router`]: inbound control frames
//! - [`websocket::broadcast::Broadcaster`]: channel filter and snapshot fan-out
//! - [`relay::run_relay`]: pumps the upstream stream into the broadcaster
//! - [`server::RelayServer`]: axum router, `/health`, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use relay::run_relay;
pub use server::RelayServer;
