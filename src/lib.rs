//! Per-guild Discord music playback: a queue-driven playback engine per
//! guild, a songbird voice transport, a yt-dlp resolver and the slash-command
//! front end that ties them together.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
