//! Online actors and editing indicators for one board channel.
//!
//! Rendering (name, avatar, color) is derived from the actor id alone so every
//! client shows the same actor the same way without a profile lookup.
//! Editing indicators are advisory leases: `renew` extends one, `sweep` drops
//! the ones that were not renewed within the TTL. They never block edits.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_EDITING_TTL_MS: i64 = 3000;

const COLORS: [&str; 7] = [
    "bg-blue-500",
    "bg-green-500",
    "bg-purple-500",
    "bg-pink-500",
    "bg-indigo-500",
    "bg-yellow-500",
    "bg-red-500",
];

const AVATARS: [&str; 8] = ["👤", "🧑‍💻", "👨‍💼", "👩‍💼", "🧑‍🎨", "👨‍🔧", "👩‍🔬", "🧑‍🚀"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarIdentity {
    pub name: String,
    pub avatar: &'static str,
    pub color: &'static str,
}

/// Derive display name, avatar and color from an actor id.
pub fn derive_identity(actor_id: &str) -> AvatarIdentity {
    let digest = Sha256::digest(actor_id.as_bytes());
    let tail: String = {
        let mut chars: Vec<char> = actor_id.chars().rev().take(4).collect();
        chars.reverse();
        chars.into_iter().collect()
    };
    AvatarIdentity {
        name: format!("User {}", tail),
        avatar: AVATARS[digest[1] as usize % AVATARS.len()],
        color: COLORS[digest[0] as usize % COLORS.len()],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub color: String,
    pub joined_at: DateTime<Utc>,
    /// Task this actor currently holds an editing lease on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_editing: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditingLease {
    pub task_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub color: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local_actor_id: String,
    users: Vec<PresenceUser>,
    leases: HashMap<String, EditingLease>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(local_actor_id: impl Into<String>, ttl_ms: i64) -> Self {
        Self {
            local_actor_id: local_actor_id.into(),
            users: Vec::new(),
            leases: HashMap::new(),
            ttl: Duration::milliseconds(ttl_ms),
        }
    }

    pub fn users(&self) -> &[PresenceUser] {
        &self.users
    }

    pub fn contains(&self, actor_id: &str) -> bool {
        self.users.iter().any(|u| u.id == actor_id)
    }

    /// Add the actor if absent. Returns `true` when a new entry was created.
    pub fn upsert(&mut self, actor_id: &str, now: DateTime<Utc>) -> bool {
        if self.contains(actor_id) {
            return false;
        }
        let identity = derive_identity(actor_id);
        let name = if actor_id == self.local_actor_id {
            format!("{} (you)", identity.name)
        } else {
            identity.name
        };
        self.users.push(PresenceUser {
            id: actor_id.to_string(),
            name,
            avatar: identity.avatar.to_string(),
            color: identity.color.to_string(),
            joined_at: now,
            is_editing: None,
        });
        true
    }

    /// Remove the actor and every editing lease it holds.
    pub fn remove(&mut self, actor_id: &str) -> Option<PresenceUser> {
        self.leases.retain(|_, lease| lease.actor_id != actor_id);
        let index = self.users.iter().position(|u| u.id == actor_id)?;
        Some(self.users.remove(index))
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.leases.clear();
    }

    /// Name to show for an actor: its presence entry, or the derived name.
    pub fn display_name(&self, actor_id: &str) -> String {
        self.users
            .iter()
            .find(|u| u.id == actor_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| derive_identity(actor_id).name)
    }

    /// Start or extend `actor_id`'s editing lease on `task_id`.
    pub fn renew(&mut self, actor_id: &str, task_id: &str, now: DateTime<Utc>) {
        let identity = derive_identity(actor_id);
        let actor_name = self.display_name(actor_id);
        let previous = self.leases.insert(
            task_id.to_string(),
            EditingLease {
                task_id: task_id.to_string(),
                actor_id: actor_id.to_string(),
                actor_name,
                color: identity.color.to_string(),
                expires_at: now + self.ttl,
            },
        );
        if let Some(previous) = previous
            && previous.actor_id != actor_id
        {
            self.set_editing(&previous.actor_id, task_id, false);
        }
        self.set_editing(actor_id, task_id, true);
    }

    /// Drop leases that expired at or before `now`. Returns the cleared task ids.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<EditingLease> = self
            .leases
            .values()
            .filter(|lease| lease.expires_at <= now)
            .cloned()
            .collect();
        for lease in &expired {
            self.leases.remove(&lease.task_id);
            self.set_editing(&lease.actor_id, &lease.task_id, false);
        }
        let mut cleared: Vec<String> = expired.into_iter().map(|l| l.task_id).collect();
        cleared.sort();
        cleared
    }

    /// The live editing indicator for a task, if any.
    pub fn editing_indicator(&self, task_id: &str, now: DateTime<Utc>) -> Option<&EditingLease> {
        self.leases.get(task_id).filter(|lease| lease.expires_at > now)
    }

    fn set_editing(&mut self, actor_id: &str, task_id: &str, editing: bool) {
        if let Some(user) = self.users.iter_mut().find(|u| u.id == actor_id) {
            if editing {
                user.is_editing = Some(task_id.to_string());
            } else if user.is_editing.as_deref() == Some(task_id) {
                user.is_editing = None;
            }
        }
    }
}
