use anyhow::{Context, Result};
use std::time::Duration;

/// Process configuration, read from the environment (and `.env` if present).
#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Guild-scoped command registration for development

    // Playback
    pub default_volume: f32,
    pub idle_disconnect_after: Duration,
    pub start_grace: Duration,
    pub handshake_timeout: Duration,
    pub handshake_poll_interval: Duration,

    // Front end
    pub cooldown_uses: u32,
    pub cooldown_window: Duration,

    // External tools
    pub ytdlp_binary: String,
    pub ffmpeg_binary: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| defaults.default_volume.to_string())
                .parse()
                .context("DEFAULT_VOLUME must be a number")?,
            idle_disconnect_after: env_duration("IDLE_DISCONNECT_AFTER", defaults.idle_disconnect_after)?,
            start_grace: env_duration("START_GRACE", defaults.start_grace)?,
            handshake_timeout: env_duration("HANDSHAKE_TIMEOUT", defaults.handshake_timeout)?,
            handshake_poll_interval: env_duration(
                "HANDSHAKE_POLL_INTERVAL",
                defaults.handshake_poll_interval,
            )?,

            cooldown_uses: std::env::var("COOLDOWN_USES")
                .unwrap_or_else(|_| defaults.cooldown_uses.to_string())
                .parse()
                .context("COOLDOWN_USES must be an integer")?,
            cooldown_window: env_duration("COOLDOWN_WINDOW", defaults.cooldown_window)?,

            ytdlp_binary: std::env::var("YTDLP_BINARY").unwrap_or(defaults.ytdlp_binary),
            ffmpeg_binary: std::env::var("FFMPEG_BINARY").unwrap_or(defaults.ffmpeg_binary),
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks that catch typos in the environment before the bot
    /// connects anywhere.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.5).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.5, got: {}",
                self.default_volume
            );
        }

        if self.handshake_poll_interval.is_zero() {
            anyhow::bail!("Handshake poll interval must be greater than 0");
        }

        if self.handshake_timeout < self.handshake_poll_interval {
            anyhow::bail!(
                "Handshake timeout ({:?}) must be at least one poll interval ({:?})",
                self.handshake_timeout,
                self.handshake_poll_interval
            );
        }

        if self.idle_disconnect_after.is_zero() {
            anyhow::bail!("Idle disconnect delay must be greater than 0");
        }

        if self.cooldown_uses == 0 {
            anyhow::bail!("Cooldown must allow at least one use per window");
        }

        Ok(())
    }

    /// The part of the configuration each guild's playback engine needs.
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_volume: self.default_volume,
            idle_disconnect_after: self.idle_disconnect_after,
            start_grace: self.start_grace,
            handshake_timeout: self.handshake_timeout,
            handshake_poll_interval: self.handshake_poll_interval,
        }
    }

    /// Token-free one-liner for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary: guild={} volume={:.2} idle={} grace={} handshake={}/{} cooldown={}/{} tools={},{}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            humantime::format_duration(self.idle_disconnect_after),
            humantime::format_duration(self.start_grace),
            humantime::format_duration(self.handshake_timeout),
            humantime::format_duration(self.handshake_poll_interval),
            self.cooldown_uses,
            humantime::format_duration(self.cooldown_window),
            self.ytdlp_binary,
            self.ffmpeg_binary,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        let player = PlayerSettings::default();
        Self {
            discord_token: String::new(),
            guild_id: None,

            default_volume: player.default_volume,
            idle_disconnect_after: player.idle_disconnect_after,
            start_grace: player.start_grace,
            handshake_timeout: player.handshake_timeout,
            handshake_poll_interval: player.handshake_poll_interval,

            cooldown_uses: 2,
            cooldown_window: Duration::from_secs(5),

            ytdlp_binary: "yt-dlp".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

/// Timing and volume knobs for one [`PlaybackEngine`](crate::audio::engine::PlaybackEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub idle_disconnect_after: Duration,
    /// How long a freshly started primary stream gets before it must report
    /// that it is actually streaming.
    pub start_grace: Duration,
    pub handshake_timeout: Duration,
    pub handshake_poll_interval: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.35,
            idle_disconnect_after: Duration::from_secs(900),
            start_grace: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(3),
            handshake_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Reads a humantime duration ("15m", "200ms", "3s") from the environment.
fn env_duration(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{key} must be a duration like '15m' or '200ms', got '{raw}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.player_settings(), PlayerSettings::default());
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = Config {
            default_volume: 1.6,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_timeout_shorter_than_poll_interval() {
        let config = Config {
            handshake_timeout: Duration::from_millis(100),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_never_contains_the_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("idle=15m"));
    }

    #[test]
    fn unset_duration_falls_back_to_default() {
        let value = env_duration("GUILD_JUKEBOX_TEST_UNSET_DURATION", Duration::from_secs(7)).unwrap();
        assert_eq!(value, Duration::from_secs(7));
    }
}
