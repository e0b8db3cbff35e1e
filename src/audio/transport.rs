//! The seam between the playback engine and whatever actually moves audio.
//!
//! The engine only ever talks to [`VoiceTransport`]; the production build
//! plugs in [`SongbirdTransport`](super::songbird_transport::SongbirdTransport),
//! tests plug in in-memory fakes.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{StartError, TransportError};

/// Control surface of one started audio stream.
#[async_trait]
pub trait StreamControl: Send + Sync {
    /// True while audio is actually flowing (not paused, not finished).
    async fn is_active(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// Stops the stream. Calling it on a finished stream is harmless.
    async fn stop(&self);

    async fn pause(&self);

    async fn resume(&self);
}

/// A stream the transport accepted, plus its one-shot end notification.
///
/// The notification fires on normal end and on decode errors alike; a dropped
/// sender counts as "ended" too.
pub struct StartedStream {
    pub control: Arc<dyn StreamControl>,
    pub finished: oneshot::Receiver<()>,
}

impl StartedStream {
    pub fn new(control: Arc<dyn StreamControl>, finished: oneshot::Receiver<()>) -> Self {
        Self { control, finished }
    }
}

/// Per-guild voice session and stream operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        self_deaf: bool,
    ) -> Result<(), TransportError>;

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError>;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Nominal bitrate (bits per second) of the channel the session is in.
    async fn channel_bitrate(&self, guild_id: GuildId) -> Option<u32>;

    /// Compressed (Opus) path at `bitrate_kbps`, with `volume` applied at the
    /// encoder side.
    async fn start_primary(
        &self,
        guild_id: GuildId,
        locator: &str,
        bitrate_kbps: u32,
        volume: f32,
    ) -> Result<StartedStream, StartError>;

    /// Raw PCM path with a post-decode `gain`.
    async fn start_fallback(
        &self,
        guild_id: GuildId,
        locator: &str,
        gain: f32,
    ) -> Result<StartedStream, StartError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError>;
}
