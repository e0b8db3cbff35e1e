use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::engine::{MAX_VOLUME, MIN_VOLUME};

/// Every slash command the bot answers to.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        play_command(),
        queue_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        volume_command(),
        ping_command(),
        help_command(),
    ]
}

/// Global registration; can take up to an hour to show up in clients.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Guild registration for development, visible immediately.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song from a URL or a search")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show what is playing and what comes next")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume a paused song")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set the volume for the next songs")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "level", "0.0 to 1.5")
                .min_number_value(MIN_VOLUME as f64)
                .max_number_value(MAX_VOLUME as f64)
                .required(true),
        )
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Check that the bot is alive")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("List the available commands")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_ten_commands() {
        assert_eq!(all_commands().len(), 10);
    }
}
