//! Board channel over a WebSocket to a remote relay.
//!
//! Each connection dials `{relay}/ws/{board_id}?actor={actor_id}` and pumps
//! text frames between the socket and a [`ChannelConnection`]. When either
//! side goes away the pump ends, the client sees its inbound queue close and
//! the sync client's reconnect logic takes over.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::channel::{ChannelConnection, ChannelTransport};

/// Connects sync clients to a relay over the network.
#[derive(Debug, Clone)]
pub struct WsTransport {
    relay_url: Url,
}

impl WsTransport {
    /// `relay_url` is the relay's WebSocket base, e.g. `ws://127.0.0.1:4040`.
    pub fn new(relay_url: &str) -> Result<Self> {
        let relay_url = Url::parse(relay_url).with_context(|| format!("Invalid relay URL '{}'", relay_url))?;
        match relay_url.scheme() {
            "ws" | "wss" => Ok(Self { relay_url }),
            other => anyhow::bail!("Relay URL must use ws or wss, not '{}'", other),
        }
    }

    pub fn endpoint(&self, board_id: &str, actor_id: &str) -> Result<Url> {
        let mut url = self.relay_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Relay URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["ws", board_id]);
        url.query_pairs_mut().clear().append_pair("actor", actor_id);
        Ok(url)
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self, board_id: &str, actor_id: &str) -> Result<ChannelConnection> {
        let url = self.endpoint(board_id, actor_id)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to relay at {}", self.relay_url))?;
        debug!(board_id = %board_id, actor_id = %actor_id, "Relay socket open");

        let (connection, mut remote) = ChannelConnection::pair();
        let (mut sink, mut source) = stream.split();
        let board_id = board_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = remote.from_client.recv() => match outbound {
                        Some(raw) => {
                            if sink.send(Message::Text(raw.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    inbound = source.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if remote.to_client.send(text.as_str().to_string()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        // Pings are answered by the socket itself.
                        Some(Ok(_)) => {}
                    },
                }
            }
            let _ = sink.close().await;
            debug!(board_id = %board_id, "Relay socket closed");
        });
        Ok(connection)
    }
}
