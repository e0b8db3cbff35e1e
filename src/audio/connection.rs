use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use super::transport::VoiceTransport;
use crate::error::PlayerError;

/// Joins or moves one guild's voice session and waits for the handshake.
pub struct ConnectionManager {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    poll_interval: Duration,
    handshake_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        poll_interval: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            guild_id,
            transport,
            poll_interval,
            handshake_timeout,
        }
    }

    /// Makes sure the session sits in `channel_id` and is ready to stream.
    ///
    /// Idempotent when already connected there; moves when connected to a
    /// different channel of the guild; joins (self-deafened) otherwise.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<(), PlayerError> {
        let connected = self.transport.is_connected(self.guild_id).await;

        if connected && self.transport.current_channel(self.guild_id).await == Some(channel_id) {
            return Ok(());
        }

        if connected {
            info!("🔀 Moving to channel {} in guild {}", channel_id, self.guild_id);
            self.transport.move_to(self.guild_id, channel_id).await?;
        } else {
            info!("🔗 Joining channel {} in guild {}", channel_id, self.guild_id);
            self.transport.join(self.guild_id, channel_id, true).await?;
        }

        let polls = (self.handshake_timeout.as_millis() / self.poll_interval.as_millis().max(1)).max(1);
        for _ in 0..polls {
            tokio::time::sleep(self.poll_interval).await;
            if self.transport.is_connected(self.guild_id).await {
                info!("🔊 Voice ready in guild {}", self.guild_id);
                return Ok(());
            }
        }

        warn!(
            "⏳ Voice handshake not confirmed after {:?} in guild {}",
            self.handshake_timeout, self.guild_id
        );
        Err(PlayerError::HandshakeTimeout)
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected(self.guild_id).await
    }

    pub async fn disconnect(&self) -> Result<(), PlayerError> {
        self.transport.disconnect(self.guild_id).await?;
        info!("👋 Left voice in guild {}", self.guild_id);
        Ok(())
    }
}
