use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use tracing::{debug, info, warn};
use url::Url;

use super::{ResolveError, TrackResolver};
use crate::audio::track::Track;

/// Opus-in-WebM first so the primary path can pass it through untouched.
const FORMAT: &str = "bestaudio[ext=webm][acodec=opus]/bestaudio/best";

/// Player clients that still hand out direct URLs when the default client
/// is stuck behind token checks.
const ALTERNATE_CLIENTS: &str = "youtube:player_client=ios,tv";

/// Resolver backed by the `yt-dlp` command line tool.
pub struct YtDlpResolver {
    binary: String,
}

#[derive(Debug, Default, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<Option<VideoInfo>>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn extract(&self, target: &str, alternate_clients: bool) -> Result<VideoInfo, ResolveError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args([
            "-J",
            "--quiet",
            "--no-warnings",
            "--no-playlist",
            "--no-check-certificates",
            "--source-address",
            "0.0.0.0",
            "-f",
            FORMAT,
        ]);
        if alternate_clients {
            cmd.args(["--extractor-args", ALTERNATE_CLIENTS]);
        }
        cmd.arg(target);

        debug!("Running {} for '{}' (alternate clients: {})", self.binary, target, alternate_clients);
        let output = cmd
            .output()
            .await
            .map_err(|e| ResolveError::ExtractionFailed(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("yt-dlp exited with an error")
                .trim()
                .to_string();
            return Err(ResolveError::ExtractionFailed(reason));
        }

        parse_info(&output.stdout)
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: Option<UserId>) -> Result<Track, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NoResults);
        }
        let target = search_target(query);

        let info = pick_entry(self.extract(&target, false).await?)?;
        if let Some(track) = into_track(&info, query, requester) {
            info!("🔍 Resolved '{}' → '{}'", query, track.title());
            return Ok(track);
        }

        warn!("No direct stream URL for '{}', retrying with alternate clients", query);
        let info = pick_entry(self.extract(&target, true).await?)?;
        into_track(&info, query, requester).ok_or_else(|| {
            ResolveError::ExtractionFailed("no direct audio URL available".to_string())
        })
    }
}

/// URLs go to yt-dlp as they are; anything else becomes a single-hit search.
fn search_target(query: &str) -> String {
    match Url::parse(query) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        _ => format!("ytsearch1:{query}"),
    }
}

fn parse_info(stdout: &[u8]) -> Result<VideoInfo, ResolveError> {
    serde_json::from_slice(stdout)
        .map_err(|e| ResolveError::ExtractionFailed(format!("unreadable yt-dlp output: {e}")))
}

/// Search results and playlists carry `entries`; take the first real one.
fn pick_entry(info: VideoInfo) -> Result<VideoInfo, ResolveError> {
    match info.entries {
        Some(entries) => entries
            .into_iter()
            .flatten()
            .next()
            .ok_or(ResolveError::NoResults),
        None => Ok(info),
    }
}

fn into_track(info: &VideoInfo, query: &str, requester: Option<UserId>) -> Option<Track> {
    let stream = info.url.as_deref().filter(|u| !u.is_empty())?;

    let title = info.title.as_deref().unwrap_or("Unknown title");
    let url = info.webpage_url.as_deref().unwrap_or(query);
    let secs = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map_or(0, |d| d as u64);

    let mut track = Track::new(title, url, stream).with_duration_secs(secs);
    if let Some(user) = requester {
        track = track.with_requester(user);
    }
    Some(track)
}
