//! Guild Session Registry.
//!
//! Maps each guild to the inbox of its worker task. Creation goes through the map's
//! entry API, so concurrent first commands for one guild always end up on one worker.

use dashmap::DashMap;
use serenity::model::id::GuildId;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    audio::{
        player::PlayerSettings,
        worker::{GuildEvent, GuildWorker},
    },
    error::PlayerError,
};

/// Cheap, cloneable reference to one guild's worker.
#[derive(Clone)]
pub struct GuildHandle {
    events: flume::Sender<GuildEvent>,
}

impl GuildHandle {
    /// Sends a command and waits for the worker's answer.
    pub async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, PlayerError>>) -> GuildEvent,
    ) -> Result<T, PlayerError> {
        let (reply, answer) = oneshot::channel();
        self.events
            .send(make(reply))
            .map_err(|_| PlayerError::SessionClosed)?;
        answer.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub fn send(&self, event: GuildEvent) -> bool {
        self.events.send(event).is_ok()
    }

    #[cfg(test)]
    pub fn is_same_session(&self, other: &GuildHandle) -> bool {
        self.events.same_channel(&other.events)
    }
}

pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildHandle>,
    settings: PlayerSettings,
}

impl SessionRegistry {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    /// Returns the guild's session, creating an empty idle one if absent.
    pub fn get_or_create(&self, guild_id: GuildId) -> GuildHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 New session for guild {}", guild_id);
                GuildHandle {
                    events: GuildWorker::spawn(guild_id, self.settings),
                }
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildHandle> {
        self.sessions.get(&guild_id).map(|h| h.clone())
    }

    /// Detaches the session from the registry without stopping it. The caller owns the
    /// teardown; commands arriving afterwards see no session.
    pub fn take(&self, guild_id: GuildId) -> Option<GuildHandle> {
        self.sessions.remove(&guild_id).map(|(_, handle)| handle)
    }

    /// Drops the session, discarding its queue and pending timer. Removing an unknown
    /// guild is a no-op. Returns whether a session existed.
    pub fn remove(&self, guild_id: GuildId) -> bool {
        match self.take(guild_id) {
            Some(handle) => {
                handle.send(GuildEvent::Shutdown);
                debug!("🗑️ Session removed for guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().send(GuildEvent::Shutdown);
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::PlaybackState;

    const GUILD: GuildId = GuildId::new(5);

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let registry = SessionRegistry::new(PlayerSettings::default());

        let first = registry.get_or_create(GUILD);
        let second = registry.get_or_create(GUILD);
        let other = registry.get_or_create(GuildId::new(6));

        assert!(first.is_same_session(&second));
        assert!(!first.is_same_session(&other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let registry = SessionRegistry::new(PlayerSettings::default());
        let handle = registry.get_or_create(GUILD);

        let (reply, answer) = oneshot::channel();
        assert!(handle.send(GuildEvent::Snapshot { reply }));
        let snapshot = answer.await.unwrap();

        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queued.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new(PlayerSettings::default());
        let handle = registry.get_or_create(GUILD);

        assert!(registry.remove(GUILD));
        assert!(!registry.remove(GUILD));
        assert!(registry.get(GUILD).is_none());

        let result = handle.request(|reply| GuildEvent::Clear { reply }).await;
        assert_eq!(result, Err(PlayerError::SessionClosed));
    }

    #[tokio::test]
    async fn test_recreated_session_is_fresh() {
        let registry = SessionRegistry::new(PlayerSettings::default());
        let old = registry.get_or_create(GUILD);
        registry.remove(GUILD);

        let new = registry.get_or_create(GUILD);
        assert!(!old.is_same_session(&new));
    }
}
