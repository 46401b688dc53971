pub mod activity;
pub mod clock;
pub mod config;
pub mod errors;
pub mod invite;
pub mod optimistic;
pub mod permission;
pub mod persistence;
pub mod presence;
pub mod relay;
pub mod replica;
pub mod session;
pub mod store;
pub mod sync;

pub use errors::{InviteError, StoreError, SyncError};
pub use optimistic::{Mutation, MutationEngine, MutationOutcome};
pub use replica::{Replica, ReplicaOptions};
pub use session::BoardSession;
