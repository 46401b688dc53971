//! Configuration view and validation commands — `boardsync config`.

use std::path::Path;

use anyhow::Result;

use super::super::ConfigCommands;
use boardsync::config::BoardsyncToml;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Boardsync Configuration");
            println!("=======================");
            println!();

            let mut toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                BoardsyncToml::load(config_path)?
            } else {
                println!("No boardsync.toml found at {}", config_path.display());
                println!("Using default configuration.");
                BoardsyncToml::default()
            };
            println!();
            toml.apply_env_overrides()?;

            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!("  cors_permissive = {}", toml.server.cors_permissive);
            println!("  room_capacity = {}", toml.server.room_capacity);
            println!();

            println!("[persistence]");
            match &toml.persistence.url {
                Some(url) => println!("  url = \"{}\"", url),
                None => println!("  url = (unset, boards stay local)"),
            }
            if toml.persistence.auth_token.is_some() {
                println!("  auth_token = (set)");
            }
            println!("  timeout_secs = {}", toml.persistence.timeout_secs);
            println!();

            println!("[channel]");
            println!("  relay_url = \"{}\"", toml.relay_url());
            println!("  max_reconnect_attempts = {}", toml.channel.max_reconnect_attempts);
            println!("  base_delay_ms = {}", toml.channel.base_delay_ms);
            println!("  max_delay_ms = {}", toml.channel.max_delay_ms);
            println!();

            println!("[presence]");
            println!("  editing_ttl_ms = {}", toml.presence.editing_ttl_ms);
            println!();

            println!("[activity]");
            println!("  capacity = {}", toml.activity.capacity);
            println!("  notification_limit = {}", toml.activity.notification_limit);
            println!("  notification_ttl_ms = {}", toml.activity.notification_ttl_ms);
            println!();

            println!("[invite]");
            println!("  origin = \"{}\"", toml.invite.origin);
            println!();

            println!("[storage]");
            println!("  dir = \"{}\"", toml.storage_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No boardsync.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = BoardsyncToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("boardsync.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to regenerate.");
                return Ok(());
            }

            BoardsyncToml::default().save(config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
