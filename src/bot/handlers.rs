use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use crate::{
    audio::{
        session::SessionSnapshot, transport::VoiceBinding, worker::EnqueueOutcome,
    },
    bot::JukeboxBot,
    error::PlayerError,
    sources::Resolution,
};

/// Queue entries shown by `/queue`.
const QUEUE_PREVIEW: usize = 10;

/// Handles slash commands
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, &command, "Music commands only work inside a server").await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => {
            let reply = match bot.player.pause(guild_id).await {
                Ok(()) => "⏸️ Paused".to_string(),
                Err(e) => failure_reply(guild_id, e),
            };
            respond(ctx, &command, reply).await
        }
        "resume" => {
            let reply = match bot.player.resume(guild_id).await {
                Ok(()) => "▶️ Playing".to_string(),
                Err(e) => failure_reply(guild_id, e),
            };
            respond(ctx, &command, reply).await
        }
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "clear" => {
            let reply = match bot.player.clear(guild_id).await {
                Ok(removed) => format!("🧹 Cleared {removed} songs from the queue"),
                Err(e) => failure_reply(guild_id, e),
            };
            respond(ctx, &command, reply).await
        }
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        "queue" => {
            let reply = match bot.player.snapshot(guild_id).await {
                Some(snapshot) => format_queue(&snapshot),
                None => "The queue is empty".to_string(),
            };
            respond(ctx, &command, reply).await
        }
        "help" => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content(help_text())
                            .ephemeral(true),
                    ),
                )
                .await?;
            Ok(())
        }
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Unknown command")
                            .ephemeral(true),
                    ),
                )
                .await?;
            Ok(())
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "song_query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .to_string();

    // Resolving can take a while
    command.defer(&ctx.http).await?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, "You will need to be in a channel to play music").await;
    };

    let resolution = match bot.sources.resolve(&query).await {
        Ok(resolution) => resolution,
        Err(e) => {
            warn!("🔍 Could not resolve '{}': {}", query, e);
            return edit(ctx, command, e.to_string()).await;
        }
    };

    let binding = match bot
        .join_voice(ctx, guild_id, voice_channel, command.channel_id)
        .await
    {
        Ok(binding) => binding,
        Err(e) => {
            error!("Could not join voice in guild {}: {:?}", guild_id, e);
            return edit(ctx, command, "I couldn't join your voice channel").await;
        }
    };

    match resolution {
        Resolution::Track(track) => {
            let reply = match bot.player.enqueue(guild_id, track, binding).await {
                Ok(outcome) => enqueue_reply(&outcome),
                Err(e) => failure_reply(guild_id, e),
            };
            edit(ctx, command, reply).await
        }
        Resolution::Playlist(queries) => {
            enqueue_playlist(ctx, command, bot, guild_id, binding, queries).await
        }
    }
}

/// Resolves and enqueues playlist entries one at a time so playback starts with the first.
async fn enqueue_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    binding: VoiceBinding,
    queries: Vec<String>,
) -> Result<()> {
    let total = queries.len();
    edit(ctx, command, format!("📋 Loading {total} songs from the playlist...")).await?;

    let mut added = 0;
    for (index, query) in queries.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(bot.config.playlist_enqueue_delay).await;
        }
        // Someone used /leave while the playlist was loading.
        if added > 0 && !bot.player.has_session(guild_id) {
            info!("📋 Playlist loading stopped in guild {}", guild_id);
            break;
        }

        let track = match bot.sources.resolve_search(query).await {
            Ok(track) => track,
            Err(e) => {
                followup(ctx, command, e.to_string()).await?;
                continue;
            }
        };

        match bot.player.enqueue(guild_id, track, binding.clone()).await {
            Ok(outcome) => {
                added += 1;
                if let EnqueueOutcome::NowPlaying(track) = outcome {
                    followup(ctx, command, format!("🎵 Now playing: **{}**", track.title)).await?;
                }
            }
            Err(e @ PlayerError::QueueFull(_)) => {
                followup(ctx, command, e.to_string()).await?;
                break;
            }
            Err(e) => warn!("Playlist entry '{}' not enqueued: {}", query, e),
        }
    }

    followup(
        ctx,
        command,
        format!("✅ Added playlist to queue ({added} of {total} songs)"),
    )
    .await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    // Skip waits for the old source to settle
    command.defer(&ctx.http).await?;

    let reply = match bot.player.skip(guild_id).await {
        Ok(next) => format!("⏭️ Skipping, now playing: **{}**", next.title),
        Err(e) => failure_reply(guild_id, e),
    };
    edit(ctx, command, reply).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let reply = match bot.player.leave(guild_id).await {
        Ok(()) => "👋 Leaving".to_string(),
        Err(PlayerError::NotInVoice | PlayerError::SessionClosed) => {
            // Connected without a session, e.g. after a failed first /play.
            match bot.drop_call(ctx, guild_id).await {
                Ok(true) => "👋 Leaving".to_string(),
                Ok(false) => PlayerError::NotInVoice.to_string(),
                Err(e) => {
                    error!("Error leaving voice in guild {}: {:?}", guild_id, e);
                    "I had trouble leaving the channel".to_string()
                }
            }
        }
        Err(e) => {
            error!("Error leaving voice in guild {}: {}", guild_id, e);
            "I had trouble leaving the channel".to_string()
        }
    };
    bot.forget_connection(guild_id);

    respond(ctx, command, reply).await
}

// Helpers

/// User-facing text for a failed player command. Transport failures are also logged.
fn failure_reply(guild_id: GuildId, e: PlayerError) -> String {
    if !e.is_precondition() {
        warn!("❌ Voice transport failure in guild {}: {}", guild_id, e);
    }
    e.to_string()
}

fn enqueue_reply(outcome: &EnqueueOutcome) -> String {
    match outcome {
        EnqueueOutcome::NowPlaying(track) => format!("🎵 Now playing: **{}**", track.title),
        EnqueueOutcome::Queued { track, position } => {
            format!("➕ Added to queue: **{}** (position {})", track.title, position)
        }
    }
}

pub fn format_queue(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::new();

    match &snapshot.now_playing {
        Some(title) => lines.push(format!("🎵 **Now playing:** {title}")),
        None => lines.push("Nothing is playing".to_string()),
    }

    if snapshot.queued.is_empty() {
        lines.push("The queue is empty".to_string());
    } else {
        lines.push(format!("**Up next ({} songs):**", snapshot.queued.len()));
        for (i, title) in snapshot.queued.iter().take(QUEUE_PREVIEW).enumerate() {
            lines.push(format!("{}. {}", i + 1, title));
        }
        if snapshot.queued.len() > QUEUE_PREVIEW {
            lines.push(format!("...and {} more", snapshot.queued.len() - QUEUE_PREVIEW));
        }
        if !snapshot.queued_duration.is_zero() {
            lines.push(format!(
                "Total length: {}",
                humantime::format_duration(snapshot.queued_duration)
            ));
        }
    }

    if snapshot.disconnect_pending {
        lines.push("💤 Leaving soon unless something is queued".to_string());
    }

    lines.join("\n")
}

pub fn help_text() -> &'static str {
    "**🎵 Commands**\n\
    `/play song_query` - Play a YouTube/Spotify link or search YouTube\n\
    `/pause` - Pause the current song\n\
    `/resume` - Resume the paused song\n\
    `/skip` - Skip to the next song in the queue\n\
    `/clear` - Remove every song waiting in the queue\n\
    `/queue` - Show the current song and the queue\n\
    `/leave` - Stop playing and leave the voice channel"
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

async fn followup(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
) -> Result<()> {
    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new().content(content),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::Track, session::PlaybackState};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn snapshot(queued: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: PlaybackState::Playing,
            now_playing: Some("Intro".into()),
            queued: (1..=queued).map(|i| format!("Song {i}")).collect(),
            queued_duration: Duration::from_secs(60 * queued as u64),
            disconnect_pending: false,
        }
    }

    #[test]
    fn test_queue_lists_upcoming_songs() {
        assert_eq!(
            format_queue(&snapshot(2)),
            "🎵 **Now playing:** Intro\n\
             **Up next (2 songs):**\n\
             1. Song 1\n\
             2. Song 2\n\
             Total length: 2m"
        );
    }

    #[test]
    fn test_long_queue_is_truncated() {
        let text = format_queue(&snapshot(14));
        assert!(text.contains("10. Song 10"));
        assert!(!text.contains("11. Song 11"));
        assert!(text.contains("...and 4 more"));
    }

    #[test]
    fn test_idle_queue_mentions_pending_disconnect() {
        let idle = SessionSnapshot {
            state: PlaybackState::AwaitingDisconnect,
            now_playing: None,
            queued: Vec::new(),
            queued_duration: Duration::ZERO,
            disconnect_pending: true,
        };

        assert_eq!(
            format_queue(&idle),
            "Nothing is playing\nThe queue is empty\n💤 Leaving soon unless something is queued"
        );
    }

    #[test]
    fn test_enqueue_replies() {
        let track = Track::new("https://cdn/a.m4a", Some("A".into()));
        assert_eq!(
            enqueue_reply(&EnqueueOutcome::NowPlaying(track.clone())),
            "🎵 Now playing: **A**"
        );
        assert_eq!(
            enqueue_reply(&EnqueueOutcome::Queued { track, position: 3 }),
            "➕ Added to queue: **A** (position 3)"
        );
    }

    #[test]
    fn test_help_lists_every_command() {
        for name in ["play", "pause", "resume", "skip", "clear", "queue", "leave"] {
            assert!(help_text().contains(&format!("`/{name}")), "{name} missing");
        }
    }
}
