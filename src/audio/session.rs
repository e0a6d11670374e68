use serenity::model::id::GuildId;
use std::time::Duration;

use crate::audio::{
    queue::{Track, TrackQueue},
    timer::DisconnectTimer,
    transport::VoiceBinding,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No audio and nothing will happen until new work arrives.
    Idle,
    /// The transport is streaming the current track.
    Playing,
    /// The transport holds the current track without advancing.
    Paused,
    /// Queue ran dry; the idle disconnect timer is armed.
    AwaitingDisconnect,
}

impl PlaybackState {
    /// Whether a source is live on the transport.
    pub fn has_live_audio(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// The track currently handed to the transport.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    /// Identifies the completion notification that belongs to this track.
    pub play_id: u64,
    pub track: Track,
}

/// All per-guild state. Owned exclusively by that guild's worker task.
#[derive(Debug)]
pub struct GuildSession {
    pub guild_id: GuildId,
    pub queue: TrackQueue,
    pub state: PlaybackState,
    pub voice: Option<VoiceBinding>,
    pub disconnect_timer: DisconnectTimer,
    pub current: Option<NowPlaying>,
    last_play_id: u64,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, max_queue_size: usize) -> Self {
        Self {
            guild_id,
            queue: TrackQueue::new(max_queue_size),
            state: PlaybackState::Idle,
            voice: None,
            disconnect_timer: DisconnectTimer::default(),
            current: None,
            last_play_id: 0,
        }
    }

    pub fn next_play_id(&mut self) -> u64 {
        self.last_play_id += 1;
        self.last_play_id
    }

    pub fn is_current(&self, play_id: u64) -> bool {
        matches!(&self.current, Some(now) if now.play_id == play_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            now_playing: self.current.as_ref().map(|now| now.track.title.clone()),
            queued: self.queue.titles(),
            queued_duration: self.queue.total_duration(),
            disconnect_pending: self.disconnect_timer.is_armed(),
        }
    }
}

/// Point-in-time copy of a session for display and inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub now_playing: Option<String>,
    pub queued: Vec<String>,
    pub queued_duration: Duration,
    pub disconnect_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle_and_empty() {
        let session = GuildSession::new(GuildId::new(1), 10);
        let snapshot = session.snapshot();

        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.queued.is_empty());
        assert!(!snapshot.disconnect_pending);
    }

    #[test]
    fn test_play_ids_are_monotonic() {
        let mut session = GuildSession::new(GuildId::new(1), 10);
        let first = session.next_play_id();
        let second = session.next_play_id();
        assert!(second > first);

        session.current = Some(NowPlaying {
            play_id: second,
            track: Track::new("x", None),
        });
        assert!(session.is_current(second));
        assert!(!session.is_current(first));
    }
}
