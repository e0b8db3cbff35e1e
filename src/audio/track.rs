use serenity::model::id::UserId;
use std::time::Duration;

/// A resolved, playable audio item.
///
/// Built once by a resolver and never mutated afterwards; the queue moves it
/// around by value and drops it after playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    url: String,
    stream_locator: String,
    duration: Option<Duration>,
    requester: Option<UserId>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        stream_locator: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            stream_locator: stream_locator.into(),
            duration: None,
            requester: None,
        }
    }

    /// Sets the length in whole seconds. Zero is treated as live/unknown.
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn with_requester(mut self, user_id: UserId) -> Self {
        self.requester = Some(user_id);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// User-facing link.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Opaque handle only the voice transport knows how to open.
    pub fn stream_locator(&self) -> &str {
        &self.stream_locator
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }
}

/// Formats a track length as `h:mm:ss` or `m:ss`; `live` when unknown.
pub fn format_duration(duration: Option<Duration>) -> String {
    let total = match duration {
        Some(d) if d.as_secs() > 0 => d.as_secs(),
        _ => return "live".to_string(),
    };

    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
