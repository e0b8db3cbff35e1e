use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    audio::{
        engine::{PlaybackEngine, MAX_VOLUME, MIN_VOLUME},
        track::format_duration,
    },
    bot::JukeboxBot,
    error::PlayerError,
    sources::ResolveError,
    ui::embeds,
};

/// Dispatches one slash command.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "❌ Commands only work inside a server", true).await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "ping" => {
            let latency = bot.gateway_latency(ctx.shard_id).await;
            return reply(ctx, &command, &ping_message(latency), false).await;
        }
        "help" => {
            return command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_help_embed())
                            .ephemeral(true),
                    ),
                )
                .await
                .map_err(Into::into)
        }
        _ => {}
    }

    let Some(registry) = bot.registry() else {
        return reply(ctx, &command, "⏳ Still starting up, try again in a moment", true).await;
    };
    let engine = registry.get_or_create(guild_id);

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, &engine, guild_id).await,
        "play" => handle_play(ctx, &command, &engine, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, &engine).await,
        "skip" => handle_skip(ctx, &command, &engine, bot).await,
        "stop" => handle_stop(ctx, &command, &engine).await,
        "pause" => handle_pause(ctx, &command, &engine).await,
        "resume" => handle_resume(ctx, &command, &engine).await,
        "volume" => handle_volume(ctx, &command, &engine).await,
        _ => reply(ctx, &command, "❌ Unknown command", true).await,
    }
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    engine: &Arc<PlaybackEngine>,
    guild_id: GuildId,
) -> Result<()> {
    let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ You need to be in a voice channel", true).await;
    };

    defer(ctx, command).await?;
    match engine.connect(channel_id).await {
        Ok(()) => edit(ctx, command, format!("🔊 Joined <#{}>", channel_id)).await,
        Err(e) => {
            warn!("Join failed in guild {}: {}", guild_id, e);
            edit_error(ctx, command, &e).await
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    engine: &Arc<PlaybackEngine>,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(wait) = bot.cooldown.check(command.user.id, "play") {
        return reply(ctx, command, &cooldown_message(wait), true).await;
    }

    let Some(query) = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
    else {
        return reply(ctx, command, "❌ Give me a URL or something to search for", true).await;
    };

    let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ You need to be in a voice channel", true).await;
    };

    // Resolution and the voice handshake can both take a few seconds.
    defer(ctx, command).await?;

    if let Err(e) = engine.connect(channel_id).await {
        warn!("Connect before play failed in guild {}: {}", guild_id, e);
        return edit_error(ctx, command, &e).await;
    }

    let track = match bot.resolver.resolve(query, Some(command.user.id)).await {
        Ok(track) => track,
        Err(e) => {
            warn!("Could not resolve '{}' in guild {}: {}", query, guild_id, e);
            return edit_error(ctx, command, &PlayerError::from(e)).await;
        }
    };

    let position = engine.queued().len() + usize::from(engine.now_playing().is_some()) + 1;
    let embed = embeds::create_track_added_embed(&track, position);
    engine.enqueue(track);

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, engine: &PlaybackEngine) -> Result<()> {
    let now_playing = engine.now_playing();
    let queued = engine.queued();
    let embed = embeds::create_queue_embed(now_playing.as_ref(), &queued);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    engine: &PlaybackEngine,
    bot: &JukeboxBot,
) -> Result<()> {
    if let Err(wait) = bot.cooldown.check(command.user.id, "skip") {
        return reply(ctx, command, &cooldown_message(wait), true).await;
    }

    let Some(current) = engine.now_playing() else {
        return reply(ctx, command, "ℹ️ Nothing is playing", true).await;
    };

    // A track that is still starting has no stream yet; the raised signal
    // ends it as soon as it does.
    engine.skip().await;
    reply(ctx, command, &format!("⏭️ Skipped **{}**", current.title()), false).await
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, engine: &Arc<PlaybackEngine>) -> Result<()> {
    defer(ctx, command).await?;
    match engine.stop(true).await {
        Ok(0) => edit(ctx, command, "⏹️ Stopped and left the channel".to_string()).await,
        Ok(discarded) => {
            let content = format!("⏹️ Stopped, removed {} queued songs and left the channel", discarded);
            edit(ctx, command, content).await
        }
        Err(e) => edit_error(ctx, command, &e).await,
    }
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, engine: &PlaybackEngine) -> Result<()> {
    if engine.pause().await {
        reply(ctx, command, "⏸️ Paused", false).await
    } else {
        reply(ctx, command, "ℹ️ Nothing is playing", true).await
    }
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, engine: &PlaybackEngine) -> Result<()> {
    if engine.resume().await {
        reply(ctx, command, "▶️ Resumed", false).await
    } else {
        reply(ctx, command, "ℹ️ Nothing is paused", true).await
    }
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, engine: &PlaybackEngine) -> Result<()> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_f64());

    match level.and_then(parse_volume) {
        Some(volume) => {
            let stored = engine.set_volume(volume);
            let mut content = format!("🔊 Volume set to {:.2}", stored);
            if let Some(current) = engine.now_playing() {
                content.push_str(&format!(
                    " (applies after **{}** `{}`)",
                    current.title(),
                    format_duration(current.duration())
                ));
            }
            reply(ctx, command, &content, false).await
        }
        None => {
            let content = format!("❌ Volume must be between {:.1} and {:.1}", MIN_VOLUME, MAX_VOLUME);
            reply(ctx, command, &content, true).await
        }
    }
}

/// Range check done before the engine sees the value.
fn parse_volume(level: f64) -> Option<f32> {
    let level = level as f32;
    (MIN_VOLUME..=MAX_VOLUME).contains(&level).then_some(level)
}

fn user_message(err: &PlayerError) -> String {
    match err {
        PlayerError::ResolutionFailed(ResolveError::NoResults) => "🔍 No results for that query".to_string(),
        PlayerError::ResolutionFailed(ResolveError::ExtractionFailed(_)) => {
            "❌ Could not get a playable stream for that track".to_string()
        }
        PlayerError::Forbidden => "🚫 I need permission to connect and speak in your voice channel".to_string(),
        PlayerError::HandshakeTimeout => {
            "⏳ Voice connection timed out (UDP may be blocked on the host)".to_string()
        }
        PlayerError::ConnectionFailed(cause) => format!("❌ Could not connect to voice: {}", cause),
        PlayerError::PlaybackStartFailed { title } => format!("❌ Could not start **{}**", title),
    }
}

fn error_title(err: &PlayerError) -> &'static str {
    match err {
        PlayerError::ResolutionFailed(_) => "Track not found",
        PlayerError::Forbidden | PlayerError::HandshakeTimeout | PlayerError::ConnectionFailed(_) => {
            "Voice connection failed"
        }
        PlayerError::PlaybackStartFailed { .. } => "Playback failed",
    }
}

fn ping_message(latency: Option<Duration>) -> String {
    match latency {
        Some(latency) => format!("🏓 Pong! Gateway latency: {} ms", latency.as_millis()),
        None => "🏓 Pong! Gateway latency not measured yet".to_string(),
    }
}

fn cooldown_message(wait: Duration) -> String {
    format!("⏱️ Slow down, try again in {:.1}s", wait.as_secs_f32())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

async fn edit_error(ctx: &Context, command: &CommandInteraction, err: &PlayerError) -> Result<()> {
    let embed = embeds::create_error_embed(error_title(err), &user_message(err));
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn volume_outside_range_is_rejected() {
        assert_eq!(parse_volume(0.0), Some(0.0));
        assert_eq!(parse_volume(1.5), Some(1.5));
        assert_eq!(parse_volume(0.8), Some(0.8));
        assert_eq!(parse_volume(1.6), None);
        assert_eq!(parse_volume(-0.1), None);
        assert_eq!(parse_volume(f64::NAN), None);
    }

    #[test]
    fn errors_map_to_distinct_messages() {
        let messages = [
            user_message(&PlayerError::ResolutionFailed(ResolveError::NoResults)),
            user_message(&PlayerError::ResolutionFailed(ResolveError::ExtractionFailed("x".into()))),
            user_message(&PlayerError::Forbidden),
            user_message(&PlayerError::HandshakeTimeout),
            user_message(&PlayerError::ConnectionFailed(TransportError::Failed("boom".into()))),
            user_message(&PlayerError::PlaybackStartFailed { title: "Song".into() }),
        ];

        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(messages[4].contains("boom"));
        assert!(messages[5].contains("Song"));
    }

    #[test]
    fn error_titles_group_by_cause() {
        assert_eq!(error_title(&PlayerError::ResolutionFailed(ResolveError::NoResults)), "Track not found");
        assert_eq!(error_title(&PlayerError::HandshakeTimeout), "Voice connection failed");
        assert_eq!(error_title(&PlayerError::Forbidden), "Voice connection failed");
        assert_eq!(
            error_title(&PlayerError::PlaybackStartFailed { title: "Song".into() }),
            "Playback failed"
        );
    }

    #[test]
    fn ping_reports_gateway_latency_in_millis() {
        assert_eq!(
            ping_message(Some(Duration::from_millis(42))),
            "🏓 Pong! Gateway latency: 42 ms"
        );
        assert_eq!(ping_message(None), "🏓 Pong! Gateway latency not measured yet");
    }

    #[test]
    fn cooldown_message_shows_seconds() {
        assert_eq!(
            cooldown_message(Duration::from_millis(2500)),
            "⏱️ Slow down, try again in 2.5s"
        );
    }
}
