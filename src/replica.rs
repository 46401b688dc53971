//! The local replica: everything one client knows about its boards.
//!
//! A `Replica` is a plain owned value. The mutation engine and the sync client
//! both take it by `&mut`, so writes from local and remote origins are
//! serialized by ownership rather than by locks.

use std::sync::Arc;

use board_common::Board;
use chrono::{DateTime, Utc};

use crate::activity::{
    ActivityEvent, ActivityKind, ActivityLog, DEFAULT_ACTIVITY_CAPACITY, DEFAULT_NOTIFICATION_LIMIT,
    DEFAULT_NOTIFICATION_TTL_MS, NotificationCenter, NotificationKind,
};
use crate::clock::{Clock, SystemClock};
use crate::permission::{self, Actor};
use crate::presence::{DEFAULT_EDITING_TTL_MS, PresenceTracker};
use crate::store::BoardStore;

/// Tunables for a replica. `config::BoardsyncToml` produces these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaOptions {
    pub editing_ttl_ms: i64,
    pub activity_capacity: usize,
    pub notification_limit: usize,
    pub notification_ttl_ms: i64,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            editing_ttl_ms: DEFAULT_EDITING_TTL_MS,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            notification_limit: DEFAULT_NOTIFICATION_LIMIT,
            notification_ttl_ms: DEFAULT_NOTIFICATION_TTL_MS,
        }
    }
}

pub struct Replica {
    pub store: BoardStore,
    pub presence: PresenceTracker,
    pub activity: ActivityLog,
    pub notifications: NotificationCenter,
    actor: Actor,
    clock: Arc<dyn Clock>,
    read_only: bool,
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("actor", &self.actor.id)
            .field("boards", &self.store.boards().len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl Replica {
    pub fn new(actor: Actor, clock: Arc<dyn Clock>, options: ReplicaOptions) -> Self {
        Self {
            store: BoardStore::new(),
            presence: PresenceTracker::new(actor.id.clone(), options.editing_ttl_ms),
            activity: ActivityLog::new(options.activity_capacity),
            notifications: NotificationCenter::new(options.notification_limit, options.notification_ttl_ms),
            actor,
            clock,
            read_only: false,
        }
    }

    /// Replica on the system clock with default options.
    pub fn for_actor(actor: Actor) -> Self {
        Self::new(actor, Arc::new(SystemClock), ReplicaOptions::default())
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Replace the board list. `read_only` marks a cache-backed fallback load.
    pub fn load(&mut self, boards: Vec<Board>, read_only: bool) {
        self.store = BoardStore::from_boards(boards);
        self.read_only = read_only;
    }

    /// Boards this replica's actor may see.
    pub fn visible_boards(&self) -> Vec<&Board> {
        permission::visible_boards(&self.actor, &self.store)
    }

    pub fn record_activity(
        &mut self,
        kind: ActivityKind,
        board_id: &str,
        actor_id: &str,
        subject: impl Into<String>,
    ) {
        let actor_name = self.presence.display_name(actor_id);
        let timestamp = self.now();
        self.activity.push(ActivityEvent {
            kind,
            board_id: board_id.to_string(),
            actor_id: actor_id.to_string(),
            actor_name,
            timestamp,
            subject: subject.into(),
        });
    }

    pub fn notify(&mut self, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> u64 {
        let now = self.now();
        self.notifications.push(kind, title, message, now)
    }

    /// Expire editing leases and notifications. Returns the task ids whose
    /// editing indicator was cleared.
    pub fn sweep(&mut self) -> Vec<String> {
        let now = self.now();
        self.notifications.sweep(now);
        self.presence.sweep(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn replica(clock: &ManualClock) -> Replica {
        Replica::new(Actor::owner("owner-1"), Arc::new(clock.clone()), ReplicaOptions::default())
    }

    #[test]
    fn test_load_sets_read_only_flag() {
        let clock = ManualClock::new(Utc::now());
        let mut replica = replica(&clock);
        assert!(!replica.is_read_only());
        replica.load(vec![Board::new("b1", "Cached")], true);
        assert!(replica.is_read_only());
        assert_eq!(replica.visible_boards().len(), 1);
    }

    #[test]
    fn test_record_activity_resolves_name_at_insertion() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut replica = replica(&clock);
        let now = replica.now();
        replica.presence.upsert("peer-abcd", now);
        replica.record_activity(ActivityKind::TaskCreated, "b1", "peer-abcd", "Call client");
        replica.presence.remove("peer-abcd");
        let event = replica.activity.latest().unwrap();
        assert_eq!(event.actor_name, "User abcd");
        assert_eq!(event.timestamp, now);
    }

    #[test]
    fn test_sweep_uses_clock() {
        let clock = ManualClock::new(Utc::now());
        let mut replica = replica(&clock);
        let now = replica.now();
        replica.presence.renew("peer-1", "t1", now);
        replica.notify(NotificationKind::Info, "Task moved", "");
        clock.advance_millis(3500);
        assert_eq!(replica.sweep(), vec!["t1"]);
        assert_eq!(replica.notifications.len(), 1);
        clock.advance_millis(2000);
        replica.sweep();
        assert!(replica.notifications.is_empty());
    }
}
