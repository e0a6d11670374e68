//! Queue & Playback State Machine.
//!
//! Every guild session is owned by one [`GuildWorker`] task. User commands, completion
//! notifications and idle-timer expiries all arrive as [`GuildEvent`]s on the worker's
//! inbox and are applied one at a time, so no two of them ever interleave.

use serenity::model::id::GuildId;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        events::CompletionBridge,
        player::PlayerSettings,
        queue::Track,
        session::{GuildSession, NowPlaying, PlaybackState, SessionSnapshot},
        transport::VoiceBinding,
    },
    error::PlayerError,
};

pub type Reply<T> = oneshot::Sender<Result<T, PlayerError>>;

/// Everything a guild worker reacts to.
#[derive(Debug)]
pub enum GuildEvent {
    Enqueue {
        track: Track,
        binding: VoiceBinding,
        reply: Reply<EnqueueOutcome>,
    },
    Skip {
        reply: Reply<Track>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Clear {
        reply: Reply<usize>,
    },
    Leave {
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Posted by the completion bridge of the track identified by `play_id`.
    TrackEnded {
        play_id: u64,
        error: Option<String>,
    },
    /// Posted by the idle timer identified by `timer_id`.
    IdleTimeout {
        timer_id: u64,
    },
    /// Drop the session without touching the transport.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The track started immediately.
    NowPlaying(Track),
    /// The track waits behind `position - 1` others.
    Queued { track: Track, position: usize },
}

/// Result of one AdvancePlayback pass.
#[derive(Debug)]
enum Advance {
    Started(Track),
    /// Queue empty; the idle timer is armed.
    Drained,
    /// Every remaining track failed to start; the idle timer is armed.
    Failed(PlayerError),
    /// No usable voice connection; nothing was popped.
    NoVoice,
}

pub struct GuildWorker {
    session: GuildSession,
    settings: PlayerSettings,
    events: flume::Sender<GuildEvent>,
    inbox: flume::Receiver<GuildEvent>,
}

impl GuildWorker {
    fn new(guild_id: GuildId, settings: PlayerSettings) -> Self {
        let (events, inbox) = flume::unbounded();
        Self {
            session: GuildSession::new(guild_id, settings.max_queue_size),
            settings,
            events,
            inbox,
        }
    }

    /// Starts a worker task and returns the sender feeding its inbox.
    pub fn spawn(guild_id: GuildId, settings: PlayerSettings) -> flume::Sender<GuildEvent> {
        let worker = Self::new(guild_id, settings);
        let events = worker.events.clone();
        tokio::spawn(worker.run());
        events
    }

    async fn run(mut self) {
        debug!("🧵 Worker started for guild {}", self.session.guild_id);

        while let Ok(event) = self.inbox.recv_async().await {
            match event {
                GuildEvent::Enqueue {
                    track,
                    binding,
                    reply,
                } => {
                    let _ = reply.send(self.enqueue(track, binding).await);
                }
                GuildEvent::Skip { reply } => {
                    let _ = reply.send(self.skip().await);
                }
                GuildEvent::Pause { reply } => {
                    let _ = reply.send(self.pause().await);
                }
                GuildEvent::Resume { reply } => {
                    let _ = reply.send(self.resume().await);
                }
                GuildEvent::Clear { reply } => {
                    let _ = reply.send(self.clear());
                }
                GuildEvent::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot());
                }
                GuildEvent::TrackEnded { play_id, error } => {
                    self.on_track_ended(play_id, error).await;
                }
                GuildEvent::IdleTimeout { timer_id } => {
                    self.on_idle_timeout(timer_id).await;
                }
                GuildEvent::Leave { reply } => {
                    let _ = reply.send(self.leave().await);
                    break;
                }
                GuildEvent::Shutdown => break,
            }
        }

        self.session.disconnect_timer.cancel();
        debug!("🧵 Worker stopped for guild {}", self.session.guild_id);
    }

    async fn enqueue(
        &mut self,
        track: Track,
        binding: VoiceBinding,
    ) -> Result<EnqueueOutcome, PlayerError> {
        self.cancel_idle_timer();
        self.session.voice = Some(binding);
        self.session.queue.push(track.clone())?;

        if self.session.state.has_live_audio() {
            return Ok(EnqueueOutcome::Queued {
                track,
                position: self.session.queue.len(),
            });
        }

        match self.advance().await {
            Advance::Started(started) => {
                info!("🎵 Now playing in guild {}: {}", self.session.guild_id, started.title);
                Ok(EnqueueOutcome::NowPlaying(started))
            }
            Advance::NoVoice => Ok(EnqueueOutcome::Queued {
                track,
                position: self.session.queue.len(),
            }),
            Advance::Failed(e) => Err(e),
            Advance::Drained => Err(PlayerError::NothingPlaying),
        }
    }

    /// AdvancePlayback: the single place that starts the next track.
    ///
    /// Pops and tries tracks until one starts. A track that fails to start is reported
    /// to the channel and dropped. When the queue runs dry the idle timer is armed.
    async fn advance(&mut self) -> Advance {
        let Some(voice) = self.session.voice.clone() else {
            debug!("No voice binding for guild {}, not advancing", self.session.guild_id);
            self.mark_silent();
            return Advance::NoVoice;
        };
        if !voice.connection.is_connected().await {
            debug!("Voice disconnected in guild {}, not advancing", self.session.guild_id);
            self.mark_silent();
            return Advance::NoVoice;
        }

        let mut last_error = None;
        loop {
            let Some(track) = self.session.queue.pop() else {
                self.go_idle();
                return match last_error {
                    Some(e) => Advance::Failed(e),
                    None => Advance::Drained,
                };
            };

            match self.start(&voice, track.clone()).await {
                Ok(()) => return Advance::Started(track),
                Err(e) => {
                    warn!(
                        "❌ Could not start {} in guild {}: {}",
                        track.title, self.session.guild_id, e
                    );
                    voice
                        .notifier
                        .notify(format!("Couldn't play **{}**, moving on", track.title))
                        .await;
                    last_error = Some(e);
                }
            }
        }
    }

    async fn start(&mut self, voice: &VoiceBinding, track: Track) -> Result<(), PlayerError> {
        let play_id = self.session.next_play_id();
        let bridge = CompletionBridge::new(self.session.guild_id, play_id, self.events.clone());

        voice.connection.play(&track, bridge).await?;

        debug!(
            "▶️ Track #{} started in guild {}: {}",
            play_id, self.session.guild_id, track.title
        );
        self.session.current = Some(NowPlaying { play_id, track });
        self.session.state = PlaybackState::Playing;
        Ok(())
    }

    /// Queue empty and nothing streaming: arm the idle timer.
    fn go_idle(&mut self) {
        self.session.current = None;
        self.session.state = PlaybackState::AwaitingDisconnect;
        self.session.disconnect_timer.arm(
            self.session.guild_id,
            self.settings.idle_delay,
            self.events.clone(),
        );
        debug!("💤 Guild {} awaiting disconnect", self.session.guild_id);
    }

    fn mark_silent(&mut self) {
        self.session.current = None;
        self.session.disconnect_timer.cancel();
        self.session.state = PlaybackState::Idle;
    }

    /// Cancels a pending idle disconnect. A session that was only waiting for that timer
    /// falls back to `Idle`.
    fn cancel_idle_timer(&mut self) {
        if self.session.disconnect_timer.cancel() {
            debug!("⏱️ Idle timer cancelled for guild {}", self.session.guild_id);
        }
        if self.session.state == PlaybackState::AwaitingDisconnect {
            self.session.state = PlaybackState::Idle;
        }
    }

    /// The connection for a control command, or `NotInVoice`.
    async fn connected_voice(&self) -> Result<VoiceBinding, PlayerError> {
        match &self.session.voice {
            Some(voice) if voice.connection.is_connected().await => Ok(voice.clone()),
            _ => Err(PlayerError::NotInVoice),
        }
    }

    async fn skip(&mut self) -> Result<Track, PlayerError> {
        self.cancel_idle_timer();
        let voice = self.connected_voice().await?;

        if self.session.state != PlaybackState::Playing {
            return Err(PlayerError::NothingPlaying);
        }
        if self.session.queue.is_empty() {
            return Err(PlayerError::NoNextSong);
        }

        // Forget the current track first: the completion raised by stopping it is stale.
        if let Some(stopped) = self.session.current.take() {
            debug!("⏭️ Skipping track #{} in guild {}", stopped.play_id, self.session.guild_id);
        }
        if let Err(e) = voice.connection.stop().await {
            warn!("Error stopping source in guild {}: {}", self.session.guild_id, e);
        }
        tokio::time::sleep(self.settings.skip_settle_delay).await;

        match self.advance().await {
            Advance::Started(track) => Ok(track),
            Advance::Failed(e) => Err(e),
            Advance::Drained => Err(PlayerError::NoNextSong),
            Advance::NoVoice => Err(PlayerError::NotInVoice),
        }
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.cancel_idle_timer();
        let voice = self.connected_voice().await?;

        if self.session.state != PlaybackState::Playing {
            return Err(PlayerError::NothingPlaying);
        }
        if let Err(e) = voice.connection.pause().await {
            self.recover_from_transport_failure(&voice).await;
            return Err(e);
        }

        self.session.state = PlaybackState::Paused;
        info!("⏸️ Playback paused in guild {}", self.session.guild_id);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        self.cancel_idle_timer();
        let voice = self.connected_voice().await?;

        if self.session.state != PlaybackState::Paused {
            return Err(PlayerError::NotPaused);
        }
        if let Err(e) = voice.connection.resume().await {
            self.recover_from_transport_failure(&voice).await;
            return Err(e);
        }

        self.session.state = PlaybackState::Playing;
        info!("▶️ Playback resumed in guild {}", self.session.guild_id);
        Ok(())
    }

    /// The current source can no longer be controlled: drop it and move on.
    async fn recover_from_transport_failure(&mut self, voice: &VoiceBinding) {
        warn!(
            "🔄 Transport failure in guild {}, advancing past current track",
            self.session.guild_id
        );
        self.session.current = None;
        let _ = voice.connection.stop().await;
        self.advance().await;
    }

    fn clear(&mut self) -> Result<usize, PlayerError> {
        self.cancel_idle_timer();

        match self.session.queue.clear() {
            0 => Err(PlayerError::NothingToClear),
            removed => Ok(removed),
        }
    }

    async fn leave(&mut self) -> Result<(), PlayerError> {
        self.session.disconnect_timer.cancel();
        self.session.queue.clear();
        let had_audio = self.session.state.has_live_audio();
        self.session.current = None;
        self.session.state = PlaybackState::Idle;

        let Some(voice) = self.session.voice.take() else {
            return Err(PlayerError::NotInVoice);
        };

        let mut failure = None;
        if had_audio {
            if let Err(e) = voice.connection.stop().await {
                warn!("Error stopping playback in guild {}: {}", self.session.guild_id, e);
                failure = Some(e);
            }
        }
        if let Err(e) = voice.connection.disconnect().await {
            error!("Error disconnecting in guild {}: {}", self.session.guild_id, e);
            failure = Some(e);
        }

        info!("👋 Session closed for guild {}", self.session.guild_id);
        failure.map_or(Ok(()), Err)
    }

    async fn on_track_ended(&mut self, play_id: u64, error: Option<String>) {
        if !self.session.is_current(play_id) {
            debug!(
                "Ignoring stale completion #{} in guild {}",
                play_id, self.session.guild_id
            );
            return;
        }

        let finished = self.session.current.take();
        if let (Some(error), Some(finished)) = (error, finished) {
            warn!(
                "❌ Playback error in guild {} for {}: {}",
                self.session.guild_id, finished.track.title, error
            );
            if let Some(voice) = &self.session.voice {
                voice
                    .notifier
                    .notify(format!("Something went wrong playing **{}**", finished.track.title))
                    .await;
            }
        }

        match self.advance().await {
            Advance::Started(track) => {
                info!("🎵 Now playing in guild {}: {}", self.session.guild_id, track.title)
            }
            Advance::Drained | Advance::Failed(_) => {
                debug!("📭 Queue finished in guild {}", self.session.guild_id)
            }
            Advance::NoVoice => {}
        }
    }

    async fn on_idle_timeout(&mut self, timer_id: u64) {
        if !self.session.disconnect_timer.claim(timer_id) {
            debug!(
                "Ignoring stale idle timer #{} in guild {}",
                timer_id, self.session.guild_id
            );
            return;
        }
        if !self.session.queue.is_empty() || self.session.state.has_live_audio() {
            return;
        }

        self.session.state = PlaybackState::Idle;
        let Some(voice) = self.session.voice.take() else {
            return;
        };
        if !voice.connection.is_connected().await {
            return;
        }

        match voice.connection.disconnect().await {
            Ok(()) => {
                info!("🚪 Disconnected from idle guild {}", self.session.guild_id);
                voice.notifier.notify("Leaving due to inactivity".to_string()).await;
            }
            Err(e) => warn!("Idle disconnect failed in guild {}: {}", self.session.guild_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{binding, track, FakeVoice, RecordingNotifier};
    use std::time::Duration;

    fn worker_with_voice() -> (GuildWorker, std::sync::Arc<FakeVoice>) {
        let mut worker = GuildWorker::new(GuildId::new(9), PlayerSettings::default());
        let voice = FakeVoice::connected();
        worker.session.voice = Some(binding(&voice, &RecordingNotifier::new()));
        (worker, voice)
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_on_empty_queue_arms_exactly_one_timer() {
        let (mut worker, voice) = worker_with_voice();

        assert!(matches!(worker.advance().await, Advance::Drained));
        assert_eq!(worker.session.state, PlaybackState::AwaitingDisconnect);
        assert!(worker.session.disconnect_timer.is_armed());

        assert!(matches!(worker.advance().await, Advance::Drained));
        assert!(worker.session.disconnect_timer.is_armed());

        tokio::time::sleep(Duration::from_secs(301)).await;
        let fired: Vec<_> = worker
            .inbox
            .drain()
            .filter(|e| matches!(e, GuildEvent::IdleTimeout { .. }))
            .collect();
        assert_eq!(fired.len(), 1);
        assert!(voice.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_without_connection_pops_nothing() {
        let (mut worker, voice) = worker_with_voice();
        voice.drop_connection();
        worker.session.queue.push(track("A")).unwrap();

        assert!(matches!(worker.advance().await, Advance::NoVoice));
        assert_eq!(worker.session.queue.len(), 1);
        assert_eq!(worker.session.state, PlaybackState::Idle);
        assert!(!worker.session.disconnect_timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_completion_does_not_advance() {
        let (mut worker, voice) = worker_with_voice();
        worker.session.queue.push(track("A")).unwrap();
        worker.session.queue.push(track("B")).unwrap();
        assert!(matches!(worker.advance().await, Advance::Started(_)));
        let current = worker.session.current.as_ref().map(|n| n.play_id).unwrap();

        worker.on_track_ended(current + 100, None).await;
        worker.on_track_ended(current - 1, None).await;

        assert_eq!(voice.started(), vec!["A"]);
        assert_eq!(worker.session.queue.titles(), vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_idle_timeout_is_ignored() {
        let (mut worker, voice) = worker_with_voice();
        worker.go_idle();
        worker.go_idle();

        worker.on_idle_timeout(1).await;
        assert_eq!(voice.disconnects(), 0);
        assert!(worker.session.disconnect_timer.is_armed());

        worker.on_idle_timeout(2).await;
        assert_eq!(voice.disconnects(), 1);
        assert_eq!(worker.session.state, PlaybackState::Idle);
    }
}
