//! Effective permission resolution for actors on boards.
//!
//! Every mutation entry point calls [`authorize`] before anything is applied
//! or sent, regardless of what the UI chose to show.

use board_common::{Board, GuestSession, MemberPermission, MemberStatus};

use crate::errors::SyncError;
use crate::store::BoardStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ActorRole {
    /// Authenticated board owner. `email` links the actor to member records
    /// on boards owned by someone else.
    Owner { email: Option<String> },
    /// Token-derived guest.
    Guest(GuestSession),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn owner(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Owner { email: None },
        }
    }

    pub fn owner_with_email(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Owner {
                email: Some(email.into()),
            },
        }
    }

    /// Guests are keyed by email so every tab of the same guest shares presence.
    pub fn guest(session: GuestSession) -> Self {
        Self {
            id: format!("guest_{}", session.email),
            role: ActorRole::Guest(session),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.role, ActorRole::Guest(_))
    }
}

/// Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectivePermission {
    View,
    Edit,
    OwnerFull,
}

impl EffectivePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::OwnerFull => "owner-full",
        }
    }

    pub fn can_edit(&self) -> bool {
        *self >= Self::Edit
    }
}

impl From<MemberPermission> for EffectivePermission {
    fn from(permission: MemberPermission) -> Self {
        match permission {
            MemberPermission::View => Self::View,
            MemberPermission::Edit | MemberPermission::Admin => Self::Edit,
        }
    }
}

/// Every guarded mutation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateBoard,
    UpdateBoard,
    DeleteBoard,
    InviteMember,
    AddColumn,
    RenameColumn,
    DeleteColumn,
    CreateTask,
    UpdateTask,
    MoveTask,
    DeleteTask,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBoard => "create_board",
            Self::UpdateBoard => "update_board",
            Self::DeleteBoard => "delete_board",
            Self::InviteMember => "invite_member",
            Self::AddColumn => "add_column",
            Self::RenameColumn => "rename_column",
            Self::DeleteColumn => "delete_column",
            Self::CreateTask => "create_task",
            Self::UpdateTask => "update_task",
            Self::MoveTask => "move_task",
            Self::DeleteTask => "delete_task",
        }
    }

    pub fn required(&self) -> EffectivePermission {
        match self {
            Self::CreateBoard | Self::UpdateBoard | Self::DeleteBoard | Self::InviteMember => {
                EffectivePermission::OwnerFull
            }
            _ => EffectivePermission::Edit,
        }
    }
}

/// Resolve what `actor` may do on `board`. `None` means no access at all.
pub fn resolve_for_board(actor: &Actor, board: &Board) -> Option<EffectivePermission> {
    match &actor.role {
        ActorRole::Owner { email } => {
            let owns = match board.owner_id.as_deref() {
                Some(owner) => owner == actor.id,
                // Boards shared in through an invite never belong to the holder.
                None => !board.is_shared,
            };
            if owns {
                return Some(EffectivePermission::OwnerFull);
            }
            let email = email.as_deref()?;
            board
                .members
                .iter()
                .find(|m| m.status == MemberStatus::Accepted && m.email.eq_ignore_ascii_case(email))
                .map(|m| m.permission.into())
        }
        ActorRole::Guest(session) => session.access_for(&board.id).map(Into::into),
    }
}

pub fn resolve_effective_permission(
    actor: &Actor,
    board_id: &str,
    store: &BoardStore,
) -> Option<EffectivePermission> {
    match store.board(board_id) {
        Some(board) => resolve_for_board(actor, board),
        // A guest may hold access to a board that has not been loaded yet.
        None => match &actor.role {
            ActorRole::Guest(session) => session.access_for(board_id).map(Into::into),
            ActorRole::Owner { .. } => None,
        },
    }
}

/// Check `action` against the actor's effective permission on `board_id`.
pub fn authorize(
    actor: &Actor,
    board_id: &str,
    action: Action,
    store: &BoardStore,
) -> Result<EffectivePermission, SyncError> {
    if action == Action::CreateBoard {
        return match actor.role {
            ActorRole::Owner { .. } => Ok(EffectivePermission::OwnerFull),
            ActorRole::Guest(_) => Err(denied(board_id, action)),
        };
    }
    let permission = resolve_effective_permission(actor, board_id, store).ok_or_else(|| {
        SyncError::NoAccess {
            board_id: board_id.to_string(),
        }
    })?;
    if permission < action.required() {
        return Err(denied(board_id, action));
    }
    Ok(permission)
}

/// Boards the actor is allowed to see, in store order.
pub fn visible_boards<'a>(actor: &Actor, store: &'a BoardStore) -> Vec<&'a Board> {
    store
        .boards()
        .iter()
        .filter(|b| resolve_for_board(actor, b).is_some())
        .collect()
}

fn denied(board_id: &str, action: Action) -> SyncError {
    SyncError::PermissionDenied {
        board_id: board_id.to_string(),
        action: action.as_str(),
        required: action.required().as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_common::{BoardAccess, BoardMember};
    use chrono::Utc;

    fn guest(permission: MemberPermission, board_id: &str) -> Actor {
        Actor::guest(GuestSession {
            email: "guest@x.com".to_string(),
            name: "guest".to_string(),
            board_access: vec![BoardAccess {
                board_id: board_id.to_string(),
                permission,
            }],
            is_guest: true,
            joined_at: Utc::now(),
        })
    }

    fn store() -> BoardStore {
        let mut mine = Board::new("b1", "Mine");
        mine.owner_id = Some("owner-1".to_string());
        let mut theirs = Board::new("b2", "Theirs");
        theirs.owner_id = Some("owner-2".to_string());
        theirs.members.push(BoardMember {
            id: "m1".to_string(),
            email: "me@x.com".to_string(),
            name: None,
            permission: MemberPermission::Admin,
            invited_at: Utc::now(),
            accepted_at: Some(Utc::now()),
            status: MemberStatus::Accepted,
            invite_token: "tok".to_string(),
        });
        let legacy = Board::new("b3", "Legacy");
        BoardStore::from_boards(vec![mine, theirs, legacy])
    }

    #[test]
    fn test_owner_gets_full_on_own_and_unowned_boards() {
        let store = store();
        let owner = Actor::owner("owner-1");
        assert_eq!(
            resolve_effective_permission(&owner, "b1", &store),
            Some(EffectivePermission::OwnerFull)
        );
        assert_eq!(
            resolve_effective_permission(&owner, "b3", &store),
            Some(EffectivePermission::OwnerFull)
        );
        assert_eq!(resolve_effective_permission(&owner, "b2", &store), None);
    }

    #[test]
    fn test_shared_board_without_owner_is_not_owned() {
        let mut shared = Board::new("b4", "Shared in");
        shared.is_shared = true;
        shared.members.push(BoardMember {
            id: "m2".to_string(),
            email: "alice@x.com".to_string(),
            name: Some("Alice".to_string()),
            permission: MemberPermission::View,
            invited_at: Utc::now(),
            accepted_at: Some(Utc::now()),
            status: MemberStatus::Accepted,
            invite_token: "tok".to_string(),
        });
        let store = BoardStore::from_boards(vec![shared]);

        assert_eq!(resolve_effective_permission(&Actor::owner("alice"), "b4", &store), None);
        assert!(matches!(
            authorize(&Actor::owner("alice"), "b4", Action::DeleteBoard, &store),
            Err(SyncError::NoAccess { .. })
        ));

        let alice = Actor::owner_with_email("alice", "alice@x.com");
        assert_eq!(
            resolve_effective_permission(&alice, "b4", &store),
            Some(EffectivePermission::View)
        );
        assert!(matches!(
            authorize(&alice, "b4", Action::DeleteBoard, &store),
            Err(SyncError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_owner_as_accepted_member_elsewhere() {
        let store = store();
        let owner = Actor::owner_with_email("owner-1", "ME@x.com");
        assert_eq!(
            resolve_effective_permission(&owner, "b2", &store),
            Some(EffectivePermission::Edit)
        );
        assert!(authorize(&owner, "b2", Action::MoveTask, &store).is_ok());
        assert!(matches!(
            authorize(&owner, "b2", Action::DeleteBoard, &store),
            Err(SyncError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_guest_resolution_by_board_access() {
        let store = store();
        let viewer = guest(MemberPermission::View, "b1");
        assert_eq!(viewer.id, "guest_guest@x.com");
        assert_eq!(
            resolve_effective_permission(&viewer, "b1", &store),
            Some(EffectivePermission::View)
        );
        assert_eq!(resolve_effective_permission(&viewer, "b2", &store), None);
    }

    #[test]
    fn test_view_guest_cannot_mutate_anything() {
        let store = store();
        let viewer = guest(MemberPermission::View, "b1");
        for action in [
            Action::CreateTask,
            Action::UpdateTask,
            Action::MoveTask,
            Action::DeleteTask,
            Action::AddColumn,
            Action::RenameColumn,
            Action::DeleteColumn,
            Action::UpdateBoard,
            Action::CreateBoard,
        ] {
            assert!(
                matches!(
                    authorize(&viewer, "b1", action, &store),
                    Err(SyncError::PermissionDenied { .. })
                ),
                "{} should be denied",
                action.as_str()
            );
        }
    }

    #[test]
    fn test_edit_guest_can_edit_tasks_but_not_board() {
        let store = store();
        let editor = guest(MemberPermission::Edit, "b1");
        assert_eq!(
            authorize(&editor, "b1", Action::CreateTask, &store).unwrap(),
            EffectivePermission::Edit
        );
        assert!(authorize(&editor, "b1", Action::InviteMember, &store).is_err());
    }

    #[test]
    fn test_no_access_error() {
        let store = store();
        let editor = guest(MemberPermission::Edit, "b1");
        assert!(matches!(
            authorize(&editor, "b2", Action::CreateTask, &store),
            Err(SyncError::NoAccess { .. })
        ));
    }

    #[test]
    fn test_guest_access_to_unloaded_board() {
        let editor = guest(MemberPermission::Edit, "remote");
        assert_eq!(
            resolve_effective_permission(&editor, "remote", &BoardStore::new()),
            Some(EffectivePermission::Edit)
        );
    }

    #[test]
    fn test_visible_boards_scoped_for_guest() {
        let store = store();
        let viewer = guest(MemberPermission::View, "b1");
        let visible: Vec<_> = visible_boards(&viewer, &store).iter().map(|b| b.id.as_str()).collect();
        assert_eq!(visible, vec!["b1"]);
        let owner = Actor::owner("owner-2");
        let visible: Vec<_> = visible_boards(&owner, &store).iter().map(|b| b.id.as_str()).collect();
        assert_eq!(visible, vec!["b2", "b3"]);
    }

    #[test]
    fn test_permission_ordering() {
        assert!(EffectivePermission::OwnerFull.can_edit());
        assert!(EffectivePermission::Edit.can_edit());
        assert!(!EffectivePermission::View.can_edit());
        assert_eq!(EffectivePermission::from(MemberPermission::Admin), EffectivePermission::Edit);
    }
}
