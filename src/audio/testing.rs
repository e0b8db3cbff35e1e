//! In-memory voice transport for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::oneshot;

use super::transport::{StartedStream, StreamControl, VoiceTransport};
use crate::error::{StartError, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Join(ChannelId),
    Move(ChannelId),
    Primary {
        locator: String,
        bitrate_kbps: u32,
        volume: f32,
    },
    Fallback {
        locator: String,
        gain: f32,
    },
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeState {
    Playing,
    Paused,
    Silent,
    Ended,
}

pub struct FakeStream {
    pub locator: String,
    state: Mutex<FakeState>,
    finished: Mutex<Option<oneshot::Sender<()>>>,
    stops: AtomicUsize,
    ended: AtomicBool,
    notify_on_stop: bool,
    live: Arc<AtomicUsize>,
}

impl FakeStream {
    pub fn state(&self) -> FakeState {
        *self.state.lock()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Marks the stream ended. The sender stays in place when `notify` is
    /// false, since dropping it would count as an end notification.
    fn end(&self, notify: bool) {
        *self.state.lock() = FakeState::Ended;
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        if notify {
            if let Some(tx) = self.finished.lock().take() {
                let _ = tx.send(());
            }
        }
    }
}

#[async_trait]
impl StreamControl for FakeStream {
    async fn is_active(&self) -> bool {
        self.state() == FakeState::Playing
    }

    async fn is_paused(&self) -> bool {
        self.state() == FakeState::Paused
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.end(self.notify_on_stop);
    }

    async fn pause(&self) {
        let mut state = self.state.lock();
        if *state == FakeState::Playing {
            *state = FakeState::Paused;
        }
    }

    async fn resume(&self) {
        let mut state = self.state.lock();
        if *state == FakeState::Paused {
            *state = FakeState::Playing;
        }
    }
}

/// Scriptable transport: per-locator lengths, rejections and silent starts.
#[derive(Default)]
pub struct FakeTransport {
    session: Mutex<Option<ChannelId>>,
    bitrate: Mutex<Option<u32>>,
    lengths: Mutex<HashMap<String, Duration>>,
    reject_primary: Mutex<HashSet<String>>,
    reject_fallback: Mutex<HashSet<String>>,
    silent_primary: Mutex<HashSet<String>>,
    mute_end_on_stop: Mutex<HashSet<String>>,
    calls: Mutex<Vec<TransportCall>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
}

impl FakeTransport {
    pub fn connected_to(channel_id: ChannelId) -> Arc<Self> {
        let transport = Self::default();
        *transport.session.lock() = Some(channel_id);
        Arc::new(transport)
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_bitrate(&self, bps: Option<u32>) {
        *self.bitrate.lock() = bps;
    }

    /// Streams for `locator` end on their own after `secs`.
    pub fn set_length(&self, locator: &str, secs: u64) {
        self.lengths
            .lock()
            .insert(locator.to_string(), Duration::from_secs(secs));
    }

    pub fn reject_primary(&self, locator: &str) {
        self.reject_primary.lock().insert(locator.to_string());
    }

    pub fn reject_fallback(&self, locator: &str) {
        self.reject_fallback.lock().insert(locator.to_string());
    }

    /// Primary starts are accepted but never begin streaming.
    pub fn silent_primary(&self, locator: &str) {
        self.silent_primary.lock().insert(locator.to_string());
    }

    /// Stopping a stream for `locator` ends it without an end notification,
    /// like a driver that drops the event for a stopped track.
    pub fn mute_end_on_stop(&self, locator: &str) {
        self.mute_end_on_stop.lock().insert(locator.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn stream_starts(&self) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Primary { .. } | TransportCall::Fallback { .. }))
            .collect()
    }

    pub fn streams_for(&self, locator: &str) -> Vec<Arc<FakeStream>> {
        self.streams
            .lock()
            .iter()
            .filter(|s| s.locator == locator)
            .cloned()
            .collect()
    }

    pub fn is_session_open(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Highest number of simultaneously unfinished streams ever observed.
    pub fn max_live_streams(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    fn open(&self, locator: &str, silent: bool) -> StartedStream {
        let (tx, rx) = oneshot::channel();
        let stream = Arc::new(FakeStream {
            locator: locator.to_string(),
            state: Mutex::new(if silent { FakeState::Silent } else { FakeState::Playing }),
            finished: Mutex::new(Some(tx)),
            stops: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            notify_on_stop: !self.mute_end_on_stop.lock().contains(locator),
            live: self.live.clone(),
        });

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let length = self.lengths.lock().get(locator).copied();
        if let (Some(length), false) = (length, silent) {
            let stream = stream.clone();
            tokio::spawn(async move {
                tokio::time::sleep(length).await;
                stream.end(true);
            });
        }

        self.streams.lock().push(stream.clone());
        StartedStream::new(stream, rx)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
        _self_deaf: bool,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Join(channel_id));
        *self.session.lock() = Some(channel_id);
        Ok(())
    }

    async fn move_to(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        self.record(TransportCall::Move(channel_id));
        *self.session.lock() = Some(channel_id);
        Ok(())
    }

    async fn is_connected(&self, _guild_id: GuildId) -> bool {
        self.is_session_open()
    }

    async fn current_channel(&self, _guild_id: GuildId) -> Option<ChannelId> {
        *self.session.lock()
    }

    async fn channel_bitrate(&self, _guild_id: GuildId) -> Option<u32> {
        *self.bitrate.lock()
    }

    async fn start_primary(
        &self,
        _guild_id: GuildId,
        locator: &str,
        bitrate_kbps: u32,
        volume: f32,
    ) -> Result<StartedStream, StartError> {
        self.record(TransportCall::Primary {
            locator: locator.to_string(),
            bitrate_kbps,
            volume,
        });
        if self.reject_primary.lock().contains(locator) {
            return Err(StartError::Rejected("opus encoder refused".into()));
        }
        let silent = self.silent_primary.lock().contains(locator);
        Ok(self.open(locator, silent))
    }

    async fn start_fallback(
        &self,
        _guild_id: GuildId,
        locator: &str,
        gain: f32,
    ) -> Result<StartedStream, StartError> {
        self.record(TransportCall::Fallback {
            locator: locator.to_string(),
            gain,
        });
        if self.reject_fallback.lock().contains(locator) {
            return Err(StartError::Rejected("pcm decoder refused".into()));
        }
        Ok(self.open(locator, false))
    }

    async fn disconnect(&self, _guild_id: GuildId) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect);
        *self.session.lock() = None;
        Ok(())
    }
}
