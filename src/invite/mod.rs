//! Guest invites: token codec, invite issuance and acceptance.
//!
//! The owner side prepares an invite (`prepare_invite`) and records it on the
//! board through the mutation engine. The guest side resolves the link with
//! `accept_invite`, which is the only way a `GuestSession` is created.

pub mod token;

use std::sync::LazyLock;

use board_common::{
    Board, BoardAccess, BoardMember, GuestSession, MemberPermission, MemberStatus,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::errors::{InviteError, SyncError};
use crate::store::BoardStore;

pub use token::{InvitePayload, decode, encode};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// `<origin>/invite/<token>`
pub fn invite_link(origin: &str, token: &str) -> String {
    format!("{}/invite/{}", origin.trim_end_matches('/'), token)
}

/// Accept either a bare token or a full invite link and return the token.
pub fn token_from_link(input: &str) -> &str {
    let input = input.trim();
    match input.rfind("/invite/") {
        Some(pos) => {
            let rest = &input[pos + "/invite/".len()..];
            rest.split(['?', '#', '/']).next().unwrap_or(rest)
        }
        None => input,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// A pending member record together with its token.
#[derive(Debug, Clone)]
pub struct PreparedInvite {
    pub member: BoardMember,
    pub token: String,
}

/// Build a pending invite for `email`.
///
/// Fails if the email is malformed or already belongs to an accepted member.
/// Expiring older pending invites for the same email happens when the member
/// is recorded on the board (`BoardStore::record_invite`).
pub fn prepare_invite(
    board: &Board,
    email: &str,
    permission: MemberPermission,
    now: DateTime<Utc>,
) -> Result<PreparedInvite, InviteError> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(InviteError::InvalidEmail(email.to_string()));
    }
    if board
        .members
        .iter()
        .any(|m| m.status == MemberStatus::Accepted && m.email.eq_ignore_ascii_case(email))
    {
        return Err(InviteError::AlreadyMember {
            email: email.to_string(),
        });
    }

    let timestamp = now.timestamp_millis();
    let token = token::encode(board, email, permission, timestamp)?;
    let member = BoardMember {
        id: format!("member_{}_{}", timestamp, uuid::Uuid::new_v4().simple()),
        email: email.to_string(),
        name: None,
        permission,
        invited_at: now,
        accepted_at: None,
        status: MemberStatus::Pending,
        invite_token: token.clone(),
    };
    Ok(PreparedInvite { member, token })
}

/// Resolve an invite token into a guest session.
///
/// If the board is known locally the matching member is marked accepted. If it
/// is not (fresh browser context) a stub shared board is bootstrapped from the
/// token payload. Expired or declined invites are rejected.
pub fn accept_invite(
    store: &mut BoardStore,
    raw_token: &str,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<GuestSession, SyncError> {
    let token = token_from_link(raw_token);
    let payload = token::decode(token)?;
    let display_name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| local_part(&payload.email).to_string());

    let existing_member = match store.board(&payload.board_id) {
        Some(board) => match board.member_by_token(token) {
            Some(member) => match member.status {
                MemberStatus::Pending | MemberStatus::Accepted => Some(member.id.clone()),
                status => {
                    return Err(InviteError::NoLongerValid {
                        status: status.as_str().to_string(),
                    }
                    .into());
                }
            },
            None => None,
        },
        None => {
            debug!(board_id = %payload.board_id, "Bootstrapping shared board from invite token");
            store.add_board(stub_board(&payload))?;
            None
        }
    };

    let member_id = match existing_member {
        Some(id) => id,
        None => {
            let member = member_from_payload(&payload, token);
            let id = member.id.clone();
            store.record_invite(&payload.board_id, member)?;
            id
        }
    };
    store.set_member_status(
        &payload.board_id,
        &member_id,
        MemberStatus::Accepted,
        now,
        Some(display_name.clone()),
    )?;

    info!(board_id = %payload.board_id, email = %payload.email, "Invite accepted");
    Ok(GuestSession {
        email: payload.email,
        name: display_name,
        board_access: vec![BoardAccess {
            board_id: payload.board_id,
            permission: payload.permission,
        }],
        is_guest: true,
        joined_at: now,
    })
}

/// Mark a pending invite as declined.
pub fn decline_invite(store: &mut BoardStore, raw_token: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
    let token = token_from_link(raw_token);
    let payload = token::decode(token)?;
    let member = store
        .board(&payload.board_id)
        .and_then(|b| b.member_by_token(token))
        .ok_or_else(|| InviteError::InvalidToken("no invite recorded for this token".to_string()))?;
    if member.status != MemberStatus::Pending {
        return Err(InviteError::NoLongerValid {
            status: member.status.as_str().to_string(),
        }
        .into());
    }
    let member_id = member.id.clone();
    store.set_member_status(&payload.board_id, &member_id, MemberStatus::Declined, now, None)?;
    Ok(())
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn stub_board(payload: &InvitePayload) -> Board {
    let mut board = Board::new(payload.board_id.clone(), payload.board_title.clone());
    board.description = payload.board_description.clone();
    if !payload.board_color.is_empty() {
        board.color = payload.board_color.clone();
    }
    board.is_shared = true;
    board
}

fn member_from_payload(payload: &InvitePayload, token: &str) -> BoardMember {
    BoardMember {
        id: format!("member_{}", payload.timestamp),
        email: payload.email.clone(),
        name: None,
        permission: payload.permission,
        invited_at: DateTime::from_timestamp_millis(payload.timestamp).unwrap_or_else(Utc::now),
        accepted_at: None,
        status: MemberStatus::Pending,
        invite_token: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_common::Column;

    fn owner_store() -> BoardStore {
        let mut board = Board::new("b1", "Sales");
        board.owner_id = Some("owner-1".to_string());
        board.columns.push(Column::new("todo", "To do"));
        BoardStore::from_boards(vec![board])
    }

    fn invite_into(store: &mut BoardStore, email: &str, permission: MemberPermission) -> PreparedInvite {
        let board = store.board("b1").unwrap().clone();
        let prepared = prepare_invite(&board, email, permission, Utc::now()).unwrap();
        store.record_invite("b1", prepared.member.clone()).unwrap();
        prepared
    }

    #[test]
    fn test_invite_link_and_back() {
        let link = invite_link("https://app.example.com/", "abc_DEF-123");
        assert_eq!(link, "https://app.example.com/invite/abc_DEF-123");
        assert_eq!(token_from_link(&link), "abc_DEF-123");
        assert_eq!(token_from_link("https://x.io/invite/tok?ref=mail"), "tok");
        assert_eq!(token_from_link("  bare-token "), "bare-token");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("guest@x.com"));
        assert!(!is_valid_email("guest@x"));
        assert!(!is_valid_email("guest x@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_prepare_invite_rejects_bad_email() {
        let store = owner_store();
        let err = prepare_invite(store.board("b1").unwrap(), "nope", MemberPermission::View, Utc::now())
            .unwrap_err();
        assert_eq!(err, InviteError::InvalidEmail("nope".to_string()));
    }

    #[test]
    fn test_prepare_invite_rejects_accepted_member() {
        let mut store = owner_store();
        let prepared = invite_into(&mut store, "guest@x.com", MemberPermission::Edit);
        let mut guest_view = store.clone();
        accept_invite(&mut guest_view, &prepared.token, None, Utc::now()).unwrap();
        let err = prepare_invite(
            guest_view.board("b1").unwrap(),
            "guest@x.com",
            MemberPermission::View,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, InviteError::AlreadyMember { .. }));
    }

    #[test]
    fn test_prepared_token_decodes_to_member() {
        let store = owner_store();
        let prepared = prepare_invite(
            store.board("b1").unwrap(),
            " guest@x.com ",
            MemberPermission::Edit,
            Utc::now(),
        )
        .unwrap();
        let payload = decode(&prepared.token).unwrap();
        assert_eq!(payload.email, "guest@x.com");
        assert_eq!(prepared.member.email, "guest@x.com");
        assert_eq!(prepared.member.status, MemberStatus::Pending);
        assert_eq!(prepared.member.invite_token, prepared.token);
    }

    #[test]
    fn test_accept_in_fresh_context_bootstraps_stub_board() {
        let owner = owner_store();
        let prepared = prepare_invite(
            owner.board("b1").unwrap(),
            "guest@x.com",
            MemberPermission::View,
            Utc::now(),
        )
        .unwrap();

        let mut fresh = BoardStore::new();
        let link = invite_link("https://app.example.com", &prepared.token);
        let session = accept_invite(&mut fresh, &link, Some("  "), Utc::now()).unwrap();

        assert!(session.is_guest);
        assert_eq!(session.name, "guest");
        assert_eq!(session.access_for("b1"), Some(MemberPermission::View));
        let board = fresh.board("b1").unwrap();
        assert!(board.is_shared);
        assert_eq!(board.title, "Sales");
        assert!(board.columns.is_empty());
        assert_eq!(board.members[0].status, MemberStatus::Accepted);
    }

    #[test]
    fn test_accept_known_board_marks_member_accepted() {
        let mut store = owner_store();
        let prepared = invite_into(&mut store, "guest@x.com", MemberPermission::Edit);
        let session = accept_invite(&mut store, &prepared.token, Some("Gus"), Utc::now()).unwrap();
        assert_eq!(session.name, "Gus");
        let board = store.board("b1").unwrap();
        assert_eq!(board.members.len(), 1);
        assert_eq!(board.members[0].status, MemberStatus::Accepted);
        assert!(board.members[0].accepted_at.is_some());
    }

    #[test]
    fn test_expired_invite_fails_closed() {
        let mut store = owner_store();
        let first = invite_into(&mut store, "guest@x.com", MemberPermission::Edit);
        let _second = invite_into(&mut store, "guest@x.com", MemberPermission::Edit);
        let err = accept_invite(&mut store, &first.token, None, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Invite(InviteError::NoLongerValid { .. })
        ));
    }

    #[test]
    fn test_invalid_token_creates_nothing() {
        let mut store = BoardStore::new();
        let err = accept_invite(&mut store, "%%%garbage", None, Utc::now()).unwrap_err();
        assert!(matches!(err, SyncError::Invite(InviteError::InvalidToken(_))));
        assert!(store.boards().is_empty());
    }

    #[test]
    fn test_decline_then_accept_is_rejected() {
        let mut store = owner_store();
        let prepared = invite_into(&mut store, "guest@x.com", MemberPermission::View);
        decline_invite(&mut store, &prepared.token, Utc::now()).unwrap();
        assert_eq!(store.board("b1").unwrap().members[0].status, MemberStatus::Declined);
        assert!(accept_invite(&mut store, &prepared.token, None, Utc::now()).is_err());
        assert!(decline_invite(&mut store, &prepared.token, Utc::now()).is_err());
    }
}
