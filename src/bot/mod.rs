//! # Bot Module
//!
//! Discord front end: slash-command registration, interaction dispatch and
//! the wiring between serenity's cache, songbird and the per-guild
//! [`PlaybackEngine`](crate::audio::engine::PlaybackEngine)s.
//!
//! The [`JukeboxBot`] handler owns no playback state itself. Every command
//! looks up (or lazily creates) its guild's engine through the
//! [`EngineRegistry`] and calls one of its operations.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, ShardId, ShardManager},
    async_trait,
};
use songbird::Songbird;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tracing::{error, info};

pub mod commands;
pub mod cooldown;
pub mod handlers;

use crate::{
    audio::{registry::EngineRegistry, songbird_transport::SongbirdTransport},
    config::Config,
    sources::TrackResolver,
};
use cooldown::Cooldown;

/// Serenity event handler for the jukebox.
///
/// The engine registry needs the serenity cache for its voice transport,
/// and the cache is only reachable from an event [`Context`], so the
/// registry is built on the first `ready` and shared from then on.
pub struct JukeboxBot {
    config: Arc<Config>,
    songbird: Arc<Songbird>,
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) cooldown: Cooldown,
    registry: OnceLock<Arc<EngineRegistry>>,
    shard_manager: OnceLock<Arc<ShardManager>>,
}

impl JukeboxBot {
    pub fn new(config: Config, songbird: Arc<Songbird>, resolver: Arc<dyn TrackResolver>) -> Self {
        let cooldown = Cooldown::new(config.cooldown_uses, config.cooldown_window);
        Self {
            config: Arc::new(config),
            songbird,
            resolver,
            cooldown,
            registry: OnceLock::new(),
            shard_manager: OnceLock::new(),
        }
    }

    /// Gives `/ping` access to the shard runners' heartbeat latency.
    pub fn set_shard_manager(&self, manager: Arc<ShardManager>) {
        let _ = self.shard_manager.set(manager);
    }

    /// Last measured heartbeat round trip of `shard_id`, if any.
    pub async fn gateway_latency(&self, shard_id: ShardId) -> Option<Duration> {
        let manager = self.shard_manager.get()?;
        let runners = manager.runners.lock().await;
        runners.get(&shard_id).and_then(|runner| runner.latency)
    }

    /// `None` until the first `ready` event.
    pub fn registry(&self) -> Option<&Arc<EngineRegistry>> {
        self.registry.get()
    }

    /// Stops every guild's playback loop.
    pub async fn shutdown(&self) {
        if let Some(registry) = self.registry() {
            registry.shutdown().await;
        }
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant)
    /// or globally otherwise (can take up to an hour to propagate).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering commands for guild {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registering commands globally");
                commands::register_global_commands(ctx).await?;
            }
        }
        info!("✅ {} slash commands registered", commands::all_commands().len());
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online in {} guilds", ready.user.name, ready.guilds.len());

        self.registry.get_or_init(|| {
            let transport = SongbirdTransport::new(
                self.songbird.clone(),
                ctx.cache.clone(),
                self.config.ffmpeg_binary.clone(),
            );
            Arc::new(EngineRegistry::new(
                Arc::new(transport),
                self.config.player_settings(),
            ))
        });

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Failed to register slash commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }
}
