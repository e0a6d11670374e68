//! Completion Bridge.
//!
//! The transport raises "source finished" from its own tasks. The bridge never touches
//! session state: it only posts [`GuildEvent::TrackEnded`] into the guild worker's inbox,
//! where the worker decides whether the notification is still current.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{
    tracks::PlayMode, Event, EventContext, EventHandler as VoiceEventHandler,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, warn};

use crate::audio::worker::GuildEvent;

/// Single-shot completion callback bound to one started track.
#[derive(Clone)]
pub struct CompletionBridge {
    guild_id: GuildId,
    play_id: u64,
    events: flume::Sender<GuildEvent>,
    fired: Arc<AtomicBool>,
}

impl CompletionBridge {
    pub(crate) fn new(guild_id: GuildId, play_id: u64, events: flume::Sender<GuildEvent>) -> Self {
        Self {
            guild_id,
            play_id,
            events,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Posts the completion to the guild worker. Only the first call of any clone has an
    /// effect; calls after the session was removed are dropped.
    pub fn notify(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        let event = GuildEvent::TrackEnded {
            play_id: self.play_id,
            error,
        };
        if self.events.send(event).is_err() {
            debug!(
                "Session for guild {} is gone, completion #{} dropped",
                self.guild_id, self.play_id
            );
        }
    }
}

/// Songbird handler forwarding `End`/`Error` track events to a [`CompletionBridge`].
#[derive(Clone)]
pub struct TrackEndNotifier {
    bridge: CompletionBridge,
}

impl TrackEndNotifier {
    pub fn new(bridge: CompletionBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut error = None;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Track error in guild {}: {:?}", self.bridge.guild_id, e);
                    error = Some(format!("{:?}", e));
                }
            }
        }

        debug!("🎵 Track #{} ended in guild {}", self.bridge.play_id, self.bridge.guild_id);
        self.bridge.notify(error);

        Some(Event::Cancel)
    }
}
