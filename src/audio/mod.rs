//! # Audio Module
//!
//! Per-guild playback scheduling.
//!
//! ## Architecture
//!
//! Each guild with activity gets one worker task that owns its session: the queue,
//! the playback state, the voice binding and the idle disconnect timer. Everything
//! that can change a session is an event on that worker's inbox.
//!
//! ### [`player`] - Audio Player
//! - Public command surface used by the bot (`enqueue`, `skip`, `pause`, ...)
//! - Routes each command to the right guild worker and awaits its answer
//!
//! ### [`worker`] - Playback State Machine
//! - Starts the next track when the current one ends or is skipped
//! - Arms the idle timer when the queue runs dry
//!
//! ### [`transport`] - Voice Transport
//! - [`transport::VoiceConnection`] abstracts the songbird call
//! - [`transport::ChannelNotifier`] posts messages to the text channel
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::player::{AudioPlayer, PlayerSettings};
//!
//! # async fn example(guild_id: serenity::all::GuildId) -> anyhow::Result<()> {
//! let player = AudioPlayer::new(PlayerSettings::default());
//!
//! player.pause(guild_id).await?;
//! player.resume(guild_id).await?;
//! player.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod timer;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub mod testing;
