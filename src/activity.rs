//! Recent-activity feed and transient notifications.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 10;
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 5;
pub const DEFAULT_NOTIFICATION_TTL_MS: i64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TaskDeleted,
    BoardCreated,
    BoardUpdated,
    BoardDeleted,
    ColumnCreated,
    ColumnRenamed,
    ColumnDeleted,
    MemberInvited,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task-created",
            Self::TaskUpdated => "task-updated",
            Self::TaskMoved => "task-moved",
            Self::TaskDeleted => "task-deleted",
            Self::BoardCreated => "board-created",
            Self::BoardUpdated => "board-updated",
            Self::BoardDeleted => "board-deleted",
            Self::ColumnCreated => "column-created",
            Self::ColumnRenamed => "column-renamed",
            Self::ColumnDeleted => "column-deleted",
            Self::MemberInvited => "member-invited",
        }
    }

    /// Past-tense verb for notification text.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::TaskCreated | Self::BoardCreated | Self::ColumnCreated => "created",
            Self::TaskUpdated | Self::BoardUpdated => "updated",
            Self::TaskMoved => "moved",
            Self::TaskDeleted | Self::BoardDeleted | Self::ColumnDeleted => "deleted",
            Self::ColumnRenamed => "renamed",
            Self::MemberInvited => "invited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub board_id: String,
    pub actor_id: String,
    /// Display name resolved when the event was recorded.
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
    /// Human readable reference to the task, column or board involved.
    pub subject: String,
}

/// Bounded feed, newest first.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: ActivityEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEvent> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Newest-first notices that disappear after a fixed TTL.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    entries: VecDeque<Notification>,
    limit: usize,
    ttl: Duration,
    next_id: u64,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_LIMIT, DEFAULT_NOTIFICATION_TTL_MS)
    }
}

impl NotificationCenter {
    pub fn new(limit: usize, ttl_ms: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
            ttl: Duration::milliseconds(ttl_ms),
            next_id: 1,
        }
    }

    pub fn push(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_front(Notification {
            id,
            kind,
            title: title.into(),
            message: message.into(),
            created_at: now,
        });
        self.entries.truncate(self.limit);
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        self.entries.len() != before
    }

    /// Drop expired notices. Returns how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|n| n.created_at + ttl > now);
        before - self.entries.len()
    }

    /// Notices still visible at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<&Notification> {
        self.entries
            .iter()
            .filter(|n| n.created_at + self.ttl > now)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> ActivityEvent {
        ActivityEvent {
            kind: ActivityKind::TaskCreated,
            board_id: "b1".to_string(),
            actor_id: "peer".to_string(),
            actor_name: "User peer".to_string(),
            timestamp: Utc::now(),
            subject: format!("Task {}", n),
        }
    }

    #[test]
    fn test_activity_log_keeps_newest_ten() {
        let mut log = ActivityLog::default();
        for n in 0..15 {
            log.push(event(n));
        }
        assert_eq!(log.len(), 10);
        assert_eq!(log.latest().unwrap().subject, "Task 14");
        assert_eq!(log.iter().last().unwrap().subject, "Task 5");
    }

    #[test]
    fn test_activity_log_zero_capacity_still_holds_one() {
        let mut log = ActivityLog::new(0);
        log.push(event(1));
        log.push(event(2));
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().subject, "Task 2");
    }

    #[test]
    fn test_activity_kind_strings() {
        assert_eq!(ActivityKind::TaskMoved.as_str(), "task-moved");
        assert_eq!(ActivityKind::ColumnRenamed.verb(), "renamed");
        let json = serde_json::to_value(event(0)).unwrap();
        assert_eq!(json["kind"], "task-created");
        assert_eq!(json["actorName"], "User peer");
    }

    #[test]
    fn test_notifications_capped_at_limit() {
        let mut center = NotificationCenter::default();
        let now = Utc::now();
        for n in 0..7 {
            center.push(NotificationKind::Info, "Task", format!("#{}", n), now);
        }
        assert_eq!(center.len(), 5);
        assert_eq!(center.iter().next().unwrap().message, "#6");
    }

    #[test]
    fn test_notifications_expire_after_ttl() {
        let mut center = NotificationCenter::default();
        let t0 = Utc::now();
        center.push(NotificationKind::Error, "Failed", "rolled back", t0);
        center.push(NotificationKind::Success, "Saved", "", t0 + Duration::milliseconds(3000));
        assert_eq!(center.active(t0 + Duration::milliseconds(4999)).len(), 2);
        assert_eq!(center.sweep(t0 + Duration::milliseconds(5000)), 1);
        assert_eq!(center.iter().next().unwrap().kind, NotificationKind::Success);
        assert_eq!(center.sweep(t0 + Duration::milliseconds(8000)), 1);
        assert!(center.is_empty());
    }

    #[test]
    fn test_dismiss() {
        let mut center = NotificationCenter::default();
        let id = center.push(NotificationKind::Warning, "Offline", "", Utc::now());
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
    }
}
