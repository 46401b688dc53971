//! Shared domain types for boardsync.
//!
//! `model` holds the board tree (boards, columns, tasks, members, guest
//! sessions) and the partial-update patches applied to it. `event` holds the
//! real-time channel envelope exchanged between clients and the relay.

pub mod event;
pub mod model;

pub use event::{ActorActivity, ChannelEnvelope, ChannelEvent, EnvelopeError};
pub use model::*;
