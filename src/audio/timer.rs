//! Idle Disconnect Timer.
//!
//! A timer never acts by itself: when its delay elapses it posts
//! [`GuildEvent::IdleTimeout`] to the guild worker, which only honours the event if the
//! timer id still matches the live slot. Cancelling therefore always wins over a timer
//! that has already fired but whose event is still queued.

use serenity::model::id::GuildId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::worker::GuildEvent;

/// Default delay before an idle guild is disconnected.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(300);

/// One pending delayed-disconnect task.
#[derive(Debug)]
struct IdleTimer {
    id: u64,
    token: CancellationToken,
}

impl IdleTimer {
    fn spawn(
        guild_id: GuildId,
        id: u64,
        delay: Duration,
        events: flume::Sender<GuildEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("⏱️ Idle timer #{} cancelled for guild {}", id, guild_id);
                }
                _ = tokio::time::sleep(delay) => {
                    debug!("⏱️ Idle timer #{} elapsed for guild {}", id, guild_id);
                    let _ = events.send(GuildEvent::IdleTimeout { timer_id: id });
                }
            }
        });

        Self { id, token }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The per-guild timer slot. At most one timer is live at a time.
#[derive(Debug, Default)]
pub struct DisconnectTimer {
    live: Option<IdleTimer>,
    next_id: u64,
}

impl DisconnectTimer {
    /// Cancels any live timer and arms a new one. Returns the new timer's id.
    pub fn arm(
        &mut self,
        guild_id: GuildId,
        delay: Duration,
        events: flume::Sender<GuildEvent>,
    ) -> u64 {
        self.cancel();

        self.next_id += 1;
        let id = self.next_id;
        self.live = Some(IdleTimer::spawn(guild_id, id, delay, events));
        debug!(
            "⏱️ Idle timer #{} armed for guild {} ({})",
            id,
            guild_id,
            humantime::format_duration(delay)
        );
        id
    }

    /// Cancels the live timer, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        // Dropping the timer cancels its token.
        self.live.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.live.is_some()
    }

    /// Accepts an elapsed-timer event only if it belongs to the live timer, clearing the
    /// slot. Stale ids (cancelled or replaced timers) are rejected.
    pub fn claim(&mut self, timer_id: u64) -> bool {
        match &self.live {
            Some(timer) if timer.id == timer_id => {
                self.live = None;
                true
            }
            _ => false,
        }
    }
}
