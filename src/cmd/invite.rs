//! Invite token commands — `boardsync invite`.

use std::path::Path;

use anyhow::{Context, Result};
use board_common::Board;
use chrono::{DateTime, Utc};

use super::super::InviteCommands;
use boardsync::config::BoardsyncToml;
use boardsync::invite;
use boardsync::store::BoardStore;

pub fn cmd_invite(config_path: &Path, command: InviteCommands) -> Result<()> {
    match command {
        InviteCommands::Encode {
            board_id,
            title,
            description,
            color,
            email,
            permission,
            origin,
        } => {
            if !invite::is_valid_email(&email) {
                anyhow::bail!("Invalid email address '{}'", email);
            }
            let origin = match origin {
                Some(origin) => origin,
                None => BoardsyncToml::load_or_default(config_path)?.invite.origin,
            };

            let mut board = Board::new(board_id, title);
            board.description = description;
            if let Some(color) = color {
                board.color = color;
            }
            let token = invite::encode(&board, email.trim(), permission, Utc::now().timestamp_millis())?;
            println!("{}", invite::invite_link(&origin, &token));
        }
        InviteCommands::Decode { token, json } => {
            let payload = invite::decode(invite::token_from_link(&token))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload).context("Failed to serialize invite")?
                );
                return Ok(());
            }

            let invited_at = DateTime::<Utc>::from_timestamp_millis(payload.timestamp)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| payload.timestamp.to_string());
            println!();
            println!("Invite");
            println!("======");
            println!("  board      = \"{}\" ({})", payload.board_title, payload.board_id);
            if !payload.board_description.is_empty() {
                println!("  about      = \"{}\"", payload.board_description);
            }
            println!("  email      = {}", payload.email);
            println!("  permission = {}", payload.permission.as_str());
            println!("  invited_at = {}", invited_at);
            println!();
        }
        InviteCommands::Accept { link, name } => {
            let mut toml = BoardsyncToml::load_or_default(config_path)?;
            toml.apply_env_overrides()?;

            let mut store = BoardStore::new();
            let session = invite::accept_invite(&mut store, &link, name.as_deref(), Utc::now())?;
            let guest_store = toml.guest_session_store();
            guest_store.save(&session)?;

            for access in &session.board_access {
                let title = store
                    .board(&access.board_id)
                    .map(|b| b.title.as_str())
                    .unwrap_or(access.board_id.as_str());
                println!(
                    "Joined \"{}\" as {} ({})",
                    title,
                    session.name,
                    access.permission.as_str()
                );
            }
            println!("Guest session saved to {}", guest_store.path().display());
        }
    }
    Ok(())
}
