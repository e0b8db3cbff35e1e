//! Per-guild playback loop.
//!
//! One [`PlaybackEngine`] exists per guild. Front-end handlers call its public
//! operations from any task; a single loop task owned by the engine pops
//! tracks, starts them on the voice transport and waits for each to end or be
//! skipped. Only the loop writes `current` and the active stream slot.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    connection::ConnectionManager,
    idle::IdleTimer,
    queue::TrackQueue,
    signal::SkipSignal,
    track::Track,
    transport::{StartedStream, StreamControl, VoiceTransport},
};
use crate::{config::PlayerSettings, error::PlayerError};

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.5;

/// Bitrate assumed when the channel does not report one.
const DEFAULT_CHANNEL_BITRATE: u32 = 128_000;

/// Opus bitrate for a channel: its nominal rate clamped to 64..=256 kbps,
/// then capped at 192 kbps.
pub fn target_bitrate_kbps(channel_bitrate_bps: Option<u32>) -> u32 {
    let bps = channel_bitrate_bps
        .filter(|bps| *bps > 0)
        .unwrap_or(DEFAULT_CHANNEL_BITRATE);
    (bps / 1000).clamp(64, 256).min(192)
}

/// NaN is treated as silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        MIN_VOLUME
    } else {
        volume.clamp(MIN_VOLUME, MAX_VOLUME)
    }
}

/// The stream currently owned by the loop, tagged by encoding path.
enum ActiveStream {
    Primary(StartedStream),
    Fallback(StartedStream),
}

impl ActiveStream {
    fn label(&self) -> &'static str {
        match self {
            ActiveStream::Primary(_) => "opus",
            ActiveStream::Fallback(_) => "pcm",
        }
    }

    fn into_stream(self) -> StartedStream {
        match self {
            ActiveStream::Primary(stream) | ActiveStream::Fallback(stream) => stream,
        }
    }
}

/// Where stream start-up currently stands.
enum StartPhase {
    StartingPrimary,
    MonitoringPrimary(StartedStream),
    StartingFallback,
    MonitoringFallback(StartedStream),
}

enum Step {
    Next(StartPhase),
    Ready(ActiveStream),
    Failed,
}

#[derive(Default)]
struct EngineState {
    current: Option<Track>,
    volume: f32,
    stream: Option<Arc<dyn StreamControl>>,
}

pub struct PlaybackEngine {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    connection: ConnectionManager,
    queue: TrackQueue,
    skip: SkipSignal,
    idle: IdleTimer,
    start_grace: Duration,
    state: Mutex<EngineState>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl PlaybackEngine {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        settings: &PlayerSettings,
    ) -> Self {
        Self {
            guild_id,
            connection: ConnectionManager::new(
                guild_id,
                transport.clone(),
                settings.handshake_poll_interval,
                settings.handshake_timeout,
            ),
            transport,
            queue: TrackQueue::new(),
            skip: SkipSignal::new(),
            idle: IdleTimer::new(settings.idle_disconnect_after),
            start_grace: settings.start_grace,
            state: Mutex::new(EngineState {
                volume: clamp_volume(settings.default_volume),
                ..EngineState::default()
            }),
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    // ---- Front-end operations ----

    /// Queues a track and makes sure the loop is running. Never blocks.
    pub fn enqueue(self: &Arc<Self>, track: Track) {
        info!("🎵 Enqueued '{}' in guild {}", track.title(), self.guild_id);
        self.queue.push(track);
        self.idle.cancel();
        self.ensure_loop();
    }

    /// Ends the current track. Returns whether a stream was playing.
    ///
    /// Harmless while idle: the signal is cleared before the next track starts.
    pub async fn skip(&self) -> bool {
        self.skip.raise();
        match self.active_stream() {
            Some(stream) => {
                stream.stop().await;
                true
            }
            None => false,
        }
    }

    /// Drops every queued track, ends the current one and optionally leaves
    /// the voice channel. Returns how many queued tracks were discarded.
    pub async fn stop(self: &Arc<Self>, disconnect: bool) -> Result<usize, PlayerError> {
        let discarded = self.queue.drain_all();
        self.skip.raise();

        if let Some(stream) = self.active_stream() {
            stream.stop().await;
        }

        info!(
            "⏹️ Stopped playback in guild {} ({} queued tracks discarded)",
            self.guild_id, discarded
        );

        if disconnect && self.connection.is_connected().await {
            self.idle.cancel();
            self.connection.disconnect().await?;
        }

        Ok(discarded)
    }

    /// Returns whether the stream went from playing to paused.
    pub async fn pause(&self) -> bool {
        let Some(stream) = self.active_stream() else {
            return false;
        };
        if !stream.is_active().await {
            return false;
        }
        stream.pause().await;
        info!("⏸️ Paused in guild {}", self.guild_id);
        true
    }

    /// Returns whether the stream went from paused to playing.
    pub async fn resume(&self) -> bool {
        let Some(stream) = self.active_stream() else {
            return false;
        };
        if !stream.is_paused().await {
            return false;
        }
        stream.resume().await;
        info!("▶️ Resumed in guild {}", self.guild_id);
        true
    }

    /// Stores the clamped volume for the next stream and returns it.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let clamped = clamp_volume(volume);
        self.state.lock().volume = clamped;
        info!("🔊 Volume set to {:.2} in guild {} (next track)", clamped, self.guild_id);
        clamped
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Joins or moves to `channel_id`. Starts the idle countdown when there is
    /// nothing to play, so a bare join does not hold the channel forever.
    pub async fn connect(self: &Arc<Self>, channel_id: ChannelId) -> Result<(), PlayerError> {
        self.connection.connect(channel_id).await?;
        if self.is_idle() {
            self.arm_idle_timer();
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    pub fn queued(&self) -> Vec<Track> {
        self.queue.snapshot()
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().current.is_none() && self.queue.is_empty()
    }

    /// Stops the loop for good. Used on process shutdown.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.idle.cancel();
        if let Some(stream) = self.active_stream() {
            stream.stop().await;
        }
    }

    // ---- Loop ----

    fn ensure_loop(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            warn!("Engine for guild {} is shut down, not starting loop", self.guild_id);
            return;
        }

        let mut task = self.task.lock();
        let alive = task.as_ref().is_some_and(|handle| !handle.is_finished());
        if !alive {
            debug!("Spawning playback loop for guild {}", self.guild_id);
            *task = Some(tokio::spawn(self.clone().run()));
        }
    }

    async fn run(self: Arc<Self>) {
        info!("🎶 Playback loop started for guild {}", self.guild_id);

        loop {
            let track = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                track = self.queue.pop() => track,
            };

            self.idle.cancel();
            self.skip.clear();
            self.state.lock().current = Some(track.clone());

            let interrupted = tokio::select! {
                _ = self.shutdown.cancelled() => true,
                _ = self.play(&track) => false,
            };

            self.finish_cycle();
            if interrupted {
                break;
            }
        }

        info!("🛑 Playback loop stopped for guild {}", self.guild_id);
    }

    /// Plays one track to its end, a skip, or a start failure.
    async fn play(&self, track: &Track) {
        if !self.connection.is_connected().await {
            warn!(
                "🔇 No voice session in guild {}, dropping '{}'",
                self.guild_id,
                track.title()
            );
            return;
        }

        let bitrate_kbps = target_bitrate_kbps(self.transport.channel_bitrate(self.guild_id).await);
        let volume = self.volume();

        let mut phase = StartPhase::StartingPrimary;
        let active = loop {
            match self.advance(phase, track, bitrate_kbps, volume).await {
                Step::Next(next) => phase = next,
                Step::Ready(active) => break active,
                Step::Failed => {
                    let err = PlayerError::PlaybackStartFailed {
                        title: track.title().to_string(),
                    };
                    error!("❌ {} in guild {}", err, self.guild_id);
                    return;
                }
            }
        };

        let path = active.label();
        let mut stream = active.into_stream();
        let skipped = tokio::select! {
            _ = &mut stream.finished => false,
            _ = self.skip.wait() => true,
        };

        if skipped {
            stream.control.stop().await;
            info!("⏭️ Skipped '{}' in guild {}", track.title(), self.guild_id);
        } else {
            info!(
                "✅ Finished '{}' ({}) in guild {}",
                track.title(),
                path,
                self.guild_id
            );
        }
    }

    /// Single transition function of the primary/fallback start-up.
    async fn advance(
        &self,
        phase: StartPhase,
        track: &Track,
        bitrate_kbps: u32,
        volume: f32,
    ) -> Step {
        match phase {
            StartPhase::StartingPrimary => {
                match self
                    .transport
                    .start_primary(self.guild_id, track.stream_locator(), bitrate_kbps, volume)
                    .await
                {
                    Ok(stream) => {
                        self.publish(&stream);
                        info!(
                            "▶️ Now playing (Opus {}k): '{}' in guild {}",
                            bitrate_kbps,
                            track.title(),
                            self.guild_id
                        );
                        Step::Next(StartPhase::MonitoringPrimary(stream))
                    }
                    Err(e) => {
                        warn!("Opus start failed for '{}': {}", track.title(), e);
                        Step::Next(StartPhase::StartingFallback)
                    }
                }
            }
            StartPhase::MonitoringPrimary(stream) => {
                if self.grace_or_skip().await || stream.control.is_active().await {
                    return Step::Ready(ActiveStream::Primary(stream));
                }
                warn!(
                    "Opus stream for '{}' not running after {:?}, switching to PCM",
                    track.title(),
                    self.start_grace
                );
                stream.control.stop().await;
                self.state.lock().stream = None;
                Step::Next(StartPhase::StartingFallback)
            }
            StartPhase::StartingFallback => {
                let gain = volume.min(1.0);
                match self
                    .transport
                    .start_fallback(self.guild_id, track.stream_locator(), gain)
                    .await
                {
                    Ok(stream) => {
                        self.publish(&stream);
                        info!(
                            "▶️ Now playing (PCM fallback): '{}' in guild {}",
                            track.title(),
                            self.guild_id
                        );
                        Step::Next(StartPhase::MonitoringFallback(stream))
                    }
                    Err(e) => {
                        warn!("PCM start failed for '{}': {}", track.title(), e);
                        Step::Failed
                    }
                }
            }
            StartPhase::MonitoringFallback(stream) => {
                if !self.grace_or_skip().await && !stream.control.is_active().await {
                    warn!(
                        "PCM stream for '{}' not running after {:?}, waiting for it to end",
                        track.title(),
                        self.start_grace
                    );
                }
                Step::Ready(ActiveStream::Fallback(stream))
            }
        }
    }

    /// Waits out the start grace period. Returns true if a skip cut it short.
    async fn grace_or_skip(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.start_grace) => false,
            _ = self.skip.wait() => true,
        }
    }

    fn publish(&self, stream: &StartedStream) {
        self.state.lock().stream = Some(stream.control.clone());
    }

    fn active_stream(&self) -> Option<Arc<dyn StreamControl>> {
        self.state.lock().stream.clone()
    }

    fn finish_cycle(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.current = None;
            state.stream = None;
        }
        if !self.shutdown.is_cancelled() {
            self.arm_idle_timer();
        }
    }

    fn arm_idle_timer(self: &Arc<Self>) {
        let engine: Weak<Self> = Arc::downgrade(self);
        self.idle.arm(async move {
            if let Some(engine) = engine.upgrade() {
                engine.disconnect_if_idle().await;
            }
        });
    }

    async fn disconnect_if_idle(&self) {
        if !self.is_idle() || !self.connection.is_connected().await {
            return;
        }
        info!(
            "💤 Idle for {:?} in guild {}, leaving voice",
            self.idle.delay(),
            self.guild_id
        );
        if let Err(e) = self.connection.disconnect().await {
            warn!("Idle disconnect failed in guild {}: {}", self.guild_id, e);
        }
    }
}
