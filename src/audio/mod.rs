//! # Audio Module
//!
//! The per-guild playback core and its voice transport.
//!
//! ## Architecture
//!
//! ### [`engine`] - Playback engine
//! - One loop task per guild pulls tracks from its [`queue`]
//! - Starts each track on the Opus path, falls back to raw PCM when the
//!   Opus stream does not come up within the start grace period
//! - Reacts to skip, stop, pause and volume changes from any task
//!
//! ### [`connection`] / [`idle`] - Voice session
//! - Join, move and handshake polling with a bounded wait
//! - Disconnects after a long idle period
//!
//! ### [`transport`] - Voice seam
//! - [`transport::VoiceTransport`] is all the engine knows about voice;
//!   [`songbird_transport`] implements it on top of songbird
//!
//! ### [`registry`] - Engine pool
//! - Exactly one engine per guild, created on first use
//!
//! ## Audio format
//!
//! - **Primary**: Opus at `min(192, channel bitrate)` kbps, never below 64
//! - **Fallback**: ffmpeg decoding to 48 kHz stereo f32 PCM

pub mod connection;
pub mod engine;
pub mod idle;
pub mod queue;
pub mod registry;
pub mod signal;
pub mod songbird_transport;
pub mod track;
pub mod transport;

#[cfg(test)]
mod testing;
