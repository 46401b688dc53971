//! Relay server command — `boardsync serve`.

use std::path::Path;

use anyhow::Result;
use tracing::warn;

use boardsync::config::BoardsyncToml;

pub async fn cmd_serve(config_path: &Path, host: Option<String>, port: Option<u16>, dev: bool) -> Result<()> {
    let mut toml = BoardsyncToml::load_or_default(config_path)?;
    toml.apply_env_overrides()?;
    for warning in toml.validate() {
        warn!("{warning}");
    }

    let mut server = toml.server_config();
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }
    if dev {
        server.cors_permissive = true;
    }

    boardsync::relay::start_server(server).await
}
