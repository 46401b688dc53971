//! Board channel relay: per-board rooms served over WebSocket.

pub mod api;
pub mod hub;
pub mod server;
pub mod ws;

pub use hub::{HubTransport, RELAY_ACTOR_ID, RelayHub};
pub use server::{ServerConfig, build_router, start_server};
