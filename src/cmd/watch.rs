//! Live board follower — `boardsync watch`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use boardsync::BoardSession;
use boardsync::config::BoardsyncToml;
use boardsync::permission::Actor;
use boardsync::persistence::LoadSource;
use boardsync::sync::InboundOutcome;

pub async fn cmd_watch(config_path: &Path, board_id: &str, actor: Option<String>) -> Result<()> {
    let mut toml = BoardsyncToml::load_or_default(config_path)?;
    toml.apply_env_overrides()?;

    let actor = match actor {
        Some(id) => Actor::owner(id),
        None => BoardSession::stored_guest(&toml.guest_session_store())?.context(
            "No --actor given and no saved guest session; run `boardsync invite accept <link>` first",
        )?,
    };

    let mut session = BoardSession::from_config(&toml, actor)?;
    match session.load(&toml.board_cache()).await {
        LoadSource::Remote => {}
        LoadSource::Cache => warn!("Persistence unreachable, showing cached boards read-only"),
        LoadSource::Empty => warn!("Persistence unreachable and nothing cached"),
    }
    session.open(board_id).await?;
    println!("Watching {} as {} (Ctrl+C to stop)", board_id, session.actor().id);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            outcome = session.next_event() => {
                match outcome? {
                    InboundOutcome::Applied(event) => match session.replica().activity.latest() {
                        Some(entry) => println!("{} {} \"{}\"", entry.actor_name, entry.kind.verb(), entry.subject),
                        None => println!("{}", event),
                    },
                    InboundOutcome::Presence(_) => {
                        let names: Vec<&str> = session
                            .replica()
                            .presence
                            .users()
                            .iter()
                            .map(|u| u.name.as_str())
                            .collect();
                        println!("Online: {}", names.join(", "));
                    }
                    InboundOutcome::Reconnected => println!("Reconnected, board refetched"),
                    _ => {}
                }
                for task_id in session.tick() {
                    println!("Editing ended on {}", task_id);
                }
            }
        }
    }

    session.close();
    Ok(())
}
