use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use guild_jukebox::{
    audio::songbird_transport::songbird_config, bot::JukeboxBot, config::Config, sources::YtDlpResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ {}", config.summary());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity_from_config(songbird_config(&config.player_settings()));
    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_binary.clone()));
    let bot = Arc::new(JukeboxBot::new(config.clone(), songbird.clone(), resolver));

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(bot.clone())
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    bot.set_shard_manager(shard_manager.clone());
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, stopping playback...");
        bot.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Connecting to Discord");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Exits successfully when both external tools run.
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_binary)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_binary)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp or ffmpeg is missing or broken");
    }
}
