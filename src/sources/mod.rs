//! Turning a user query (URL or search text) into a playable [`Track`].

pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use thiserror::Error;

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no results for that query")]
    NoResults,

    /// The extractor ran but produced no direct stream, or failed outright.
    #[error("could not extract a playable stream: {0}")]
    ExtractionFailed(String),
}

/// Resolves queries into tracks. Never touches voice state.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requester: Option<UserId>) -> Result<Track, ResolveError>;
}
