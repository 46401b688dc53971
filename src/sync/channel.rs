//! Client side of a board channel.
//!
//! A `ChannelTransport` opens one connection per (board, actor). The
//! connection is a pair of unbounded queues of raw JSON envelopes, so the
//! sync client never sees whether the relay is in-process or remote.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use board_common::ChannelEnvelope;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self, board_id: &str, actor_id: &str) -> Result<ChannelConnection>;
}

/// One live subscription to a board channel.
#[derive(Debug)]
pub struct ChannelConnection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

/// The relay-facing half of a [`ChannelConnection`].
#[derive(Debug)]
pub struct RemoteEnd {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ChannelConnection {
    pub fn new(outbound: mpsc::UnboundedSender<String>, inbound: mpsc::UnboundedReceiver<String>) -> Self {
        Self { outbound, inbound }
    }

    /// A connected client half and relay half.
    pub fn pair() -> (Self, RemoteEnd) {
        let (to_remote, from_client) = mpsc::unbounded_channel();
        let (to_client, from_remote) = mpsc::unbounded_channel();
        (
            Self::new(to_remote, from_remote),
            RemoteEnd {
                to_client,
                from_client,
            },
        )
    }

    pub fn send(&self, envelope: &ChannelEnvelope) -> Result<()> {
        let raw = envelope.to_json().context("Failed to serialize channel envelope")?;
        self.send_raw(raw)
    }

    pub fn send_raw(&self, raw: String) -> Result<()> {
        self.outbound
            .send(raw)
            .map_err(|_| anyhow::anyhow!("channel closed"))
    }

    /// Next raw message. `None` once the relay side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }
}

/// Bounded exponential backoff for (re)connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_common::ChannelEvent;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(2), Duration::from_millis(500));
        assert_eq!(policy.delay(3), Duration::from_secs(1));
        assert_eq!(policy.delay(10), Duration::from_secs(5));
        assert_eq!(policy.delay(100), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pair_carries_messages_both_ways() {
        let (mut client, mut remote) = ChannelConnection::pair();
        client
            .send(&ChannelEnvelope::new("b1", "a1", ChannelEvent::UserJoined))
            .unwrap();
        let raw = remote.from_client.recv().await.unwrap();
        assert!(raw.contains("\"user-joined\""));

        remote.to_client.send("hello".to_string()).unwrap();
        assert_eq!(client.recv().await.as_deref(), Some("hello"));
        drop(remote);
        assert!(client.recv().await.is_none());
        assert!(client.send_raw("late".to_string()).is_err());
    }
}
