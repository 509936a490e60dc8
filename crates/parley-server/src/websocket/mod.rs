//! WebSocket connection management, heartbeat, fan-out, and the upgrade
//! handlers.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;
