//! Seam between the scheduler and the voice transport.
//!
//! The scheduler only ever talks to [`VoiceConnection`] and [`ChannelNotifier`]; the
//! songbird-backed implementation lives here, the text-channel one in the bot module.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{ControlError, TrackHandle},
    Call, Event, Songbird, TrackEvent,
};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{events::CompletionBridge, events::TrackEndNotifier, queue::Track},
    error::PlayerError,
};

/// One logical voice connection for one guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Starts `track`, replacing anything that was playing. `on_end` must be raised
    /// exactly once when the source finishes, is stopped, or errors.
    async fn play(&self, track: &Track, on_end: CompletionBridge) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn resume(&self) -> Result<(), PlayerError>;

    async fn stop(&self) -> Result<(), PlayerError>;

    async fn disconnect(&self) -> Result<(), PlayerError>;
}

/// Text channel the session reports unsolicited events to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelNotifier: Send + Sync {
    async fn notify(&self, message: String);
}

/// Voice connection plus the channel that asked for it.
#[derive(Clone)]
pub struct VoiceBinding {
    pub connection: Arc<dyn VoiceConnection>,
    pub notifier: Arc<dyn ChannelNotifier>,
}

impl fmt::Debug for VoiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceBinding").finish_non_exhaustive()
    }
}

/// [`VoiceConnection`] backed by a songbird [`Call`].
pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    pub fn new(guild_id: GuildId, manager: Arc<Songbird>, call: Arc<Mutex<Call>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            guild_id,
            manager,
            call,
            http,
            current: SyncMutex::new(None),
        }
    }

    /// Whether this connection drives `call`. Songbird hands out a new call after the
    /// previous one was removed.
    pub fn drives(&self, call: &Arc<Mutex<Call>>) -> bool {
        Arc::ptr_eq(&self.call, call)
    }

    fn current_handle(&self) -> Result<TrackHandle, PlayerError> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| PlayerError::Transport("no active track".into()))
    }
}

fn control_error(e: ControlError) -> PlayerError {
    PlayerError::Transport(e.to_string())
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn play(&self, track: &Track, on_end: CompletionBridge) -> Result<(), PlayerError> {
        let input: Input = HttpRequest::new(self.http.clone(), track.audio_source.clone()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        let notifier = TrackEndNotifier::new(on_end);
        handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(control_error)?;
        handle
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(control_error)?;

        debug!("🎵 Source started in guild {}: {}", self.guild_id, track.title);
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.current_handle()?.pause().map_err(control_error)
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.current_handle()?.play().map_err(control_error)
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let Some(handle) = self.current.lock().take() else {
            return Ok(());
        };

        match handle.stop() {
            Ok(()) | Err(ControlError::Finished) => Ok(()),
            Err(e) => Err(control_error(e)),
        }
    }

    async fn disconnect(&self) -> Result<(), PlayerError> {
        self.current.lock().take();

        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Left voice channel in guild {}", self.guild_id);
                Ok(())
            }
            Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => {
                warn!("Error leaving voice in guild {}: {:?}", self.guild_id, e);
                Err(PlayerError::Transport(e.to_string()))
            }
        }
    }
}
