//! Self-contained guest invite tokens.
//!
//! A token is the JSON invite payload encoded with the URL-safe base64
//! alphabet and no padding. It carries enough board data for a guest opening
//! the link in a fresh browser to render a stub board before any sync.
//! Tokens are not signed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use board_common::{Board, MemberPermission};
use serde::{Deserialize, Serialize};

use crate::errors::InviteError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub board_id: String,
    pub board_title: String,
    #[serde(default)]
    pub board_description: String,
    #[serde(default)]
    pub board_color: String,
    pub email: String,
    pub permission: MemberPermission,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub random: String,
}

/// Encode an invite for `email` on `board`.
pub fn encode(
    board: &Board,
    email: &str,
    permission: MemberPermission,
    timestamp: i64,
) -> Result<String, InviteError> {
    let payload = InvitePayload {
        board_id: board.id.clone(),
        board_title: board.title.clone(),
        board_description: board.description.clone(),
        board_color: board.color.clone(),
        email: email.to_string(),
        permission,
        timestamp,
        random: nonce(),
    };
    encode_payload(&payload)
}

/// Encode a payload. Refuses anything `decode` would reject.
pub fn encode_payload(payload: &InvitePayload) -> Result<String, InviteError> {
    check_payload(payload).map_err(InviteError::Encode)?;
    let json = serde_json::to_vec(payload).map_err(|e| InviteError::Encode(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a token. Any malformed input is rejected outright.
pub fn decode(token: &str) -> Result<InvitePayload, InviteError> {
    let normalized: String = token
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    if normalized.is_empty() {
        return Err(InviteError::InvalidToken("empty token".to_string()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| InviteError::InvalidToken(format!("not base64url: {}", e)))?;
    let payload: InvitePayload = serde_json::from_slice(&bytes)
        .map_err(|e| InviteError::InvalidToken(format!("unreadable payload: {}", e)))?;

    check_payload(&payload).map_err(InviteError::InvalidToken)?;
    Ok(payload)
}

fn check_payload(payload: &InvitePayload) -> Result<(), String> {
    if payload.board_id.trim().is_empty() {
        return Err("missing boardId".to_string());
    }
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err("missing or invalid email".to_string());
    }
    if payload.timestamp <= 0 {
        return Err("missing timestamp".to_string());
    }
    Ok(())
}

fn nonce() -> String {
    let mut random = uuid::Uuid::new_v4().simple().to_string();
    random.truncate(13);
    random
}
