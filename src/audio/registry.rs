use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::{engine::PlaybackEngine, transport::VoiceTransport};
use crate::config::PlayerSettings;

/// Lazily created playback engines, one per guild, shared by every handler.
pub struct EngineRegistry {
    engines: DashMap<GuildId, Arc<PlaybackEngine>>,
    transport: Arc<dyn VoiceTransport>,
    settings: PlayerSettings,
}

impl EngineRegistry {
    pub fn new(transport: Arc<dyn VoiceTransport>, settings: PlayerSettings) -> Self {
        Self {
            engines: DashMap::new(),
            transport,
            settings,
        }
    }

    /// Returns the guild's engine, creating it on first use.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<PlaybackEngine> {
        self.engines
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Creating playback engine for guild {}", guild_id);
                Arc::new(PlaybackEngine::new(
                    guild_id,
                    self.transport.clone(),
                    &self.settings,
                ))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackEngine>> {
        self.engines.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Stops every engine's loop. Engines stay registered but no longer play.
    pub async fn shutdown(&self) {
        let engines: Vec<_> = self.engines.iter().map(|e| e.value().clone()).collect();
        info!("🛑 Shutting down {} playback engines", engines.len());
        for engine in engines {
            engine.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{testing::FakeTransport, track::Track};
    use serenity::model::id::ChannelId;
    use std::time::Duration;

    fn registry() -> (EngineRegistry, Arc<FakeTransport>) {
        let transport = FakeTransport::connected_to(ChannelId::new(5));
        (
            EngineRegistry::new(transport.clone(), PlayerSettings::default()),
            transport,
        )
    }

    #[tokio::test]
    async fn same_guild_gets_same_engine() {
        let (registry, _) = registry();
        let first = registry.get_or_create(GuildId::new(1));
        let second = registry.get_or_create(GuildId::new(1));
        let other = registry.get_or_create(GuildId::new(2));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn get_does_not_create() {
        let (registry, _) = registry();
        assert!(registry.get(GuildId::new(9)).is_none());
        assert!(registry.is_empty());

        let engine = registry.get_or_create(GuildId::new(9));
        let found = registry.get(GuildId::new(9)).unwrap();
        assert!(Arc::ptr_eq(&engine, &found));
    }

    #[tokio::test]
    async fn engines_start_with_configured_volume() {
        let transport = FakeTransport::connected_to(ChannelId::new(5));
        let settings = PlayerSettings {
            default_volume: 0.8,
            ..PlayerSettings::default()
        };
        let registry = EngineRegistry::new(transport, settings);
        assert_eq!(registry.get_or_create(GuildId::new(3)).volume(), 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_engine() {
        let (registry, transport) = registry();
        registry
            .get_or_create(GuildId::new(1))
            .enqueue(Track::new("a", "https://example.com/a", "a"));
        registry
            .get_or_create(GuildId::new(2))
            .enqueue(Track::new("b", "https://example.com/b", "b"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.stream_starts().len(), 2);

        registry.shutdown().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        for locator in ["a", "b"] {
            assert_eq!(
                transport.streams_for(locator)[0].state(),
                crate::audio::testing::FakeState::Ended
            );
        }
    }
}
