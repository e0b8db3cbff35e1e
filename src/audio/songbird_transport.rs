use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    driver::Bitrate,
    error::{ConnectionError, JoinError},
    input::{ChildContainer, HttpRequest, Input, RawAdapter},
    tracks::{PlayMode, Track as SongbirdTrack, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    process::{Command, Stdio},
    sync::Arc,
};
use symphonia::core::io::ReadOnlySource;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::transport::{StartedStream, StreamControl, VoiceTransport};
use crate::{
    config::PlayerSettings,
    error::{StartError, TransportError},
};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;

/// Songbird configuration whose gateway and driver handshakes give up after
/// the configured handshake timeout.
pub fn songbird_config(settings: &PlayerSettings) -> songbird::Config {
    songbird::Config::default()
        .gateway_timeout(Some(settings.handshake_timeout))
        .driver_timeout(Some(settings.handshake_timeout))
}

/// Timeouts (gateway or UDP/driver) are kept apart from other failures.
fn classify_join_error(err: JoinError) -> TransportError {
    match err {
        JoinError::TimedOut | JoinError::Driver(ConnectionError::TimedOut) => TransportError::TimedOut,
        JoinError::NoCall => TransportError::NotConnected,
        other => TransportError::Failed(other.to_string()),
    }
}

/// The track starts at `volume`, so no audio goes out at the driver default.
fn prepared_track(input: Input, volume: f32) -> SongbirdTrack {
    SongbirdTrack::new(input).volume(volume)
}

/// Runs `stop` when a freshly started track could not be set up, so it never
/// keeps playing unobserved.
fn stop_on_failure<T, E: std::fmt::Display>(result: Result<T, E>, stop: impl FnOnce()) -> Result<T, StartError> {
    result.map_err(|e| {
        stop();
        StartError::Rejected(e.to_string())
    })
}

/// [`VoiceTransport`] over songbird calls, with permissions and channel
/// bitrates read from the serenity cache.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
    ffmpeg_binary: String,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>, ffmpeg_binary: impl Into<String>) -> Self {
        Self {
            manager,
            cache,
            http: reqwest::Client::new(),
            ffmpeg_binary: ffmpeg_binary.into(),
        }
    }

    /// Connect and Speak in the target channel. Unknown guild or member
    /// state is let through; songbird reports the failure then.
    fn check_permissions(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            debug!("Guild {} not cached, skipping permission check", guild_id);
            return Ok(());
        };
        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id)) else {
            debug!("Channel or bot member not cached in guild {}", guild_id);
            return Ok(());
        };

        let permissions = guild.user_permissions_in(channel, member);
        if permissions.connect() && permissions.speak() {
            Ok(())
        } else {
            warn!("🚫 Missing Connect/Speak in channel {} of guild {}", channel_id, guild_id);
            Err(TransportError::Forbidden)
        }
    }

    async fn enter(&self, guild_id: GuildId, channel_id: ChannelId, self_deaf: bool) -> Result<(), TransportError> {
        self.check_permissions(guild_id, channel_id)?;

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(classify_join_error)?;

        if self_deaf {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("Could not self-deafen in guild {}: {}", guild_id, e);
            }
        }
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, input: Input, volume: f32, bitrate_kbps: Option<u32>) -> Result<StartedStream, StartError> {
        let call = self.manager.get(guild_id).ok_or(StartError::NotConnected)?;

        let handle = {
            let mut handler = call.lock().await;
            if handler.current_connection().is_none() {
                return Err(StartError::NotConnected);
            }
            if let Some(kbps) = bitrate_kbps {
                handler.set_bitrate(Bitrate::BitsPerSecond((kbps * 1000) as i32));
            }
            handler.play(prepared_track(input, volume))
        };

        stop_on_failure(handle.make_playable_async().await, || {
            let _ = handle.stop();
        })?;

        let (tx, rx) = oneshot::channel();
        let notifier = EndNotifier {
            guild_id,
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            stop_on_failure(handle.add_event(Event::Track(event), notifier.clone()), || {
                let _ = handle.stop();
            })?;
        }

        Ok(StartedStream::new(Arc::new(SongbirdStream { handle }), rx))
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId, self_deaf: bool) -> Result<(), TransportError> {
        self.enter(guild_id, channel_id, self_deaf).await
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        // Joining another channel of the same guild moves the existing call.
        self.enter(guild_id, channel_id, true).await
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.manager.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    async fn channel_bitrate(&self, guild_id: GuildId) -> Option<u32> {
        let channel_id = self.current_channel(guild_id).await?;
        let guild = self.cache.guild(guild_id)?;
        guild.channels.get(&channel_id).and_then(|channel| channel.bitrate)
    }

    async fn start_primary(
        &self,
        guild_id: GuildId,
        locator: &str,
        bitrate_kbps: u32,
        volume: f32,
    ) -> Result<StartedStream, StartError> {
        let input: Input = HttpRequest::new(self.http.clone(), locator.to_string()).into();
        self.play(guild_id, input, volume, Some(bitrate_kbps)).await
    }

    async fn start_fallback(&self, guild_id: GuildId, locator: &str, gain: f32) -> Result<StartedStream, StartError> {
        let child = Command::new(&self.ffmpeg_binary)
            .args(["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"])
            .args(["-i", locator])
            .args(["-vn", "-ac", "2", "-ar", "48000", "-loglevel", "warning"])
            .args(["-f", "f32le", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StartError::Rejected(format!("failed to spawn {}: {}", self.ffmpeg_binary, e)))?;

        let pcm = RawAdapter::new(ReadOnlySource::new(ChildContainer::from(child)), SAMPLE_RATE, CHANNELS);
        self.play(guild_id, pcm.into(), gain, None).await
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.manager.remove(guild_id).await.map_err(classify_join_error)
    }
}

struct SongbirdStream {
    handle: TrackHandle,
}

#[async_trait]
impl StreamControl for SongbirdStream {
    async fn is_active(&self) -> bool {
        match self.handle.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play) && !state.position.is_zero(),
            Err(_) => false,
        }
    }

    async fn is_paused(&self) -> bool {
        matches!(
            self.handle.get_info().await,
            Ok(state) if matches!(state.playing, PlayMode::Pause)
        )
    }

    async fn stop(&self) {
        // Fails only when the track is already gone.
        let _ = self.handle.stop();
    }

    async fn pause(&self) {
        let _ = self.handle.pause();
    }

    async fn resume(&self) {
        let _ = self.handle.play();
    }
}

/// Fires the stream's end notification on the first End or Error event.
#[derive(Clone)]
struct EndNotifier {
    guild_id: GuildId,
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Track error in guild {}: {}", self.guild_id, e);
                }
            }
        }

        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(());
        }
        Some(Event::Cancel)
    }
}
