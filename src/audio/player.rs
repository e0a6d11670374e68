use serenity::model::id::GuildId;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    audio::{
        queue::Track,
        registry::SessionRegistry,
        session::SessionSnapshot,
        timer::DEFAULT_IDLE_DELAY,
        transport::VoiceBinding,
        worker::{EnqueueOutcome, GuildEvent},
    },
    config::Config,
    error::PlayerError,
};

/// Tunables shared by every guild worker.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSettings {
    pub idle_delay: Duration,
    pub skip_settle_delay: Duration,
    pub max_queue_size: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_delay: DEFAULT_IDLE_DELAY,
            skip_settle_delay: Duration::from_millis(500),
            max_queue_size: 1000,
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_delay: config.idle_disconnect_delay,
            skip_settle_delay: config.skip_settle_delay,
            max_queue_size: config.max_queue_size,
        }
    }
}

/// Per-guild playback scheduler. Every method is safe to call concurrently; commands
/// for one guild are applied in arrival order by that guild's worker.
pub struct AudioPlayer {
    registry: SessionRegistry,
}

impl AudioPlayer {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            registry: SessionRegistry::new(settings),
        }
    }

    /// Appends `track` to the guild's queue, starting it if nothing is playing.
    ///
    /// `binding` refreshes the session's voice connection and notification channel.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        track: Track,
        binding: VoiceBinding,
    ) -> Result<EnqueueOutcome, PlayerError> {
        let handle = self.registry.get_or_create(guild_id);
        let first = handle
            .request(|reply| GuildEvent::Enqueue {
                track: track.clone(),
                binding: binding.clone(),
                reply,
            })
            .await;

        match first {
            // Raced a leave: the old session is gone, start a fresh one.
            Err(PlayerError::SessionClosed) => {
                debug!("Session for guild {} closed mid-enqueue, retrying", guild_id);
                self.registry
                    .get_or_create(guild_id)
                    .request(|reply| GuildEvent::Enqueue {
                        track,
                        binding,
                        reply,
                    })
                    .await
            }
            other => other,
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, PlayerError> {
        let handle = self.registry.get(guild_id).ok_or(PlayerError::NotInVoice)?;
        handle.request(|reply| GuildEvent::Skip { reply }).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let handle = self.registry.get(guild_id).ok_or(PlayerError::NotInVoice)?;
        handle.request(|reply| GuildEvent::Pause { reply }).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let handle = self.registry.get(guild_id).ok_or(PlayerError::NotInVoice)?;
        handle.request(|reply| GuildEvent::Resume { reply }).await
    }

    /// Empties the queue without touching the current track. Returns how many tracks
    /// were removed.
    pub async fn clear(&self, guild_id: GuildId) -> Result<usize, PlayerError> {
        let handle = self
            .registry
            .get(guild_id)
            .ok_or(PlayerError::NothingToClear)?;
        handle.request(|reply| GuildEvent::Clear { reply }).await
    }

    /// Stops playback, disconnects and removes the session. The session is gone even
    /// when the transport reports an error.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let handle = self.registry.take(guild_id).ok_or(PlayerError::NotInVoice)?;
        info!(
            "👋 Leaving guild {} ({} sessions left)",
            guild_id,
            self.registry.len()
        );
        handle.request(|reply| GuildEvent::Leave { reply }).await
    }

    /// Drops the session without talking to the transport, e.g. after the bot was
    /// disconnected from outside.
    pub fn forget(&self, guild_id: GuildId) -> bool {
        self.registry.remove(guild_id)
    }

    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.registry.get(guild_id).is_some()
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<SessionSnapshot> {
        let handle = self.registry.get(guild_id)?;
        let (reply, answer) = oneshot::channel();
        if !handle.send(GuildEvent::Snapshot { reply }) {
            return None;
        }
        answer.await.ok()
    }
}
