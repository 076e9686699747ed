//! `WebSocket` connection management, inbound routing, and fan-out.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod router;
pub mod session;
