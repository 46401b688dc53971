//! Real-time board channel: transport seam, the WebSocket transport and the
//! sync client.

pub mod channel;
pub mod client;
pub mod ws;

pub use channel::{ChannelConnection, ChannelTransport, ReconnectPolicy, RemoteEnd};
pub use client::{InboundOutcome, SyncClient};
pub use ws::WsTransport;
