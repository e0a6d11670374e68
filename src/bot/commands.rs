use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers global commands
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for one guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        clear_command(),
        leave_command(),
        queue_command(),
        help_command(),
    ]
}

// Playback commands

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Add something to play from YouTube or Spotify, or search by name")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "song_query",
                "Spotify/YouTube URL or search query",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the currently playing song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused song")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next song in the queue")
}

// Queue commands

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Remove every song waiting in the queue")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current song and the queue")
}

// Connection

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Stop playing and leave the voice channel")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("List the available commands")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_is_registered_once() {
        let names: Vec<String> = all_commands()
            .iter()
            .filter_map(|command| {
                serde_json::to_value(command)
                    .ok()
                    .and_then(|v| v["name"].as_str().map(str::to_string))
            })
            .collect();

        assert_eq!(
            names,
            vec!["play", "pause", "resume", "skip", "clear", "leave", "queue", "help"]
        );
    }
}
