use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::track::{format_duration, Track};

/// How many upcoming tracks the queue listing shows before "+N more".
pub const QUEUE_PAGE_SIZE: usize = 10;

const FOOTER: &str = "🎵 Guild Jukebox";

/// Color palette shared by every embed.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Added to queue")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", format_duration(track.duration()), true)
        .field("📍 Position", position.to_string(), true);

    if let Some(user) = track.requester() {
        embed = embed.field("👤 Requested by", format!("<@{}>", user), true);
    }

    embed
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

pub fn create_queue_embed(now_playing: Option<&Track>, queued: &[Track]) -> CreateEmbed {
    CreateEmbed::default()
        .title("📜 Queue")
        .description(queue_listing(now_playing, queued))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// Now playing, then up to [`QUEUE_PAGE_SIZE`] upcoming tracks and a
/// "+N more" line for the rest.
pub fn queue_listing(now_playing: Option<&Track>, queued: &[Track]) -> String {
    let mut lines = Vec::with_capacity(QUEUE_PAGE_SIZE + 3);

    match now_playing {
        Some(track) => lines.push(format!(
            "▶️ **{}** `{}`",
            track.title(),
            format_duration(track.duration())
        )),
        None => lines.push("Nothing is playing.".to_string()),
    }

    if queued.is_empty() {
        lines.push("The queue is empty.".to_string());
        return lines.join("\n");
    }

    lines.push(String::new());
    for (i, track) in queued.iter().take(QUEUE_PAGE_SIZE).enumerate() {
        lines.push(format!(
            "`{}.` {} `{}`",
            i + 1,
            track.title(),
            format_duration(track.duration())
        ));
    }
    if queued.len() > QUEUE_PAGE_SIZE {
        lines.push(format!("… +{} more", queued.len() - QUEUE_PAGE_SIZE));
    }

    lines.join("\n")
}

pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Playback",
            "• `/play <query>` - Play a URL or search result\n\
            • `/pause` - Pause the current song\n\
            • `/resume` - Resume playback\n\
            • `/skip` - Skip the current song\n\
            • `/stop` - Stop, clear the queue and leave",
            false,
        )
        .field(
            "📜 Queue & audio",
            "• `/queue` - Show the queue\n\
            • `/volume <0.0-1.5>` - Volume for the next songs",
            false,
        )
        .field(
            "🔊 Connection",
            "• `/join` - Join your voice channel\n\
            • `/ping` - Check the bot is alive",
            false,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracks(n: usize) -> Vec<Track> {
        (1..=n)
            .map(|i| Track::new(format!("Song {i}"), "https://example.com", "loc").with_duration_secs(60 * i as u64))
            .collect()
    }

    #[test]
    fn empty_listing() {
        assert_eq!(queue_listing(None, &[]), "Nothing is playing.\nThe queue is empty.");
    }

    #[test]
    fn listing_caps_at_ten_with_more_line() {
        let current = Track::new("Live", "https://example.com", "loc");
        let queued = tracks(13);
        let listing = queue_listing(Some(&current), &queued);
        let lines: Vec<_> = listing.lines().collect();

        assert_eq!(lines[0], "▶️ **Live** `live`");
        assert_eq!(lines[2], "`1.` Song 1 `1:00`");
        assert_eq!(lines[11], "`10.` Song 10 `10:00`");
        assert_eq!(lines[12], "… +3 more");
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn short_queue_has_no_more_line() {
        let listing = queue_listing(None, &tracks(2));
        assert!(!listing.contains("more"));
        assert!(listing.contains("`2.` Song 2 `2:00`"));
    }
}
