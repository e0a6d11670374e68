//! # Bot Module
//!
//! Discord front end for the per-guild music scheduler.
//!
//! - Command registration and handling
//! - Voice connection management
//! - Cleanup when the bot is disconnected from outside
//!
//! The bot is built around the [`JukeboxBot`] struct which implements Serenity's
//! [`EventHandler`] trait. Playback decisions are left to [`AudioPlayer`]; this module
//! only turns interactions into player commands and player results into replies.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{
    audio::{
        player::{AudioPlayer, PlayerSettings},
        transport::{SongbirdConnection, VoiceBinding},
    },
    config::Config,
    sources::SourceManager,
};
use notifier::TextChannelNotifier;

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration
/// - `player`: Per-guild playback scheduler
/// - `sources`: Track resolver used by `/play`
/// - `connections`: Songbird-backed voice connection per guild, reused across commands
///   so the playing track handle stays reachable
pub struct JukeboxBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
    pub sources: Arc<SourceManager>,
    connections: DashMap<GuildId, Arc<SongbirdConnection>>,
}

impl JukeboxBot {
    pub fn new(config: Config) -> Self {
        let player = Arc::new(AudioPlayer::new(PlayerSettings::from(&config)));
        let sources = Arc::new(SourceManager::from_config(&config));

        Self {
            config: Arc::new(config),
            player,
            sources,
            connections: DashMap::new(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `GUILD_ID` is set (instant propagation, meant
    /// for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registering guild commands: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register guild commands. Check that the bot has the 'applications.commands' scope in the guild."
                    )
                })?;
                info!("✅ Guild commands registered for: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registering global commands: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check that the bot has the 'applications.commands' scope."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Joins `voice_channel`, or moves there when connected elsewhere in the guild, and
    /// returns the binding the player should use for this guild.
    pub async fn join_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<VoiceBinding> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

        let in_place = match manager.get(guild_id) {
            Some(call) => {
                let current = call.lock().await.current_channel();
                (current.map(|c| c.0.get()) == Some(voice_channel.get())).then_some(call)
            }
            None => None,
        };

        let call = match in_place {
            Some(call) => call,
            None => {
                let call = manager.join(guild_id, voice_channel).await?;
                info!("🔊 Connected to voice channel {} in guild {}", voice_channel, guild_id);
                call
            }
        };

        let connection = {
            let mut entry = self.connections.entry(guild_id).or_insert_with(|| {
                Arc::new(SongbirdConnection::new(guild_id, manager.clone(), call.clone()))
            });
            if !entry.drives(&call) {
                debug!("Replacing stale voice connection for guild {}", guild_id);
                *entry = Arc::new(SongbirdConnection::new(guild_id, manager.clone(), call.clone()));
            }
            entry.clone()
        };

        Ok(VoiceBinding {
            connection,
            notifier: Arc::new(TextChannelNotifier::new(text_channel, ctx.http.clone())),
        })
    }

    /// Leaves voice when songbird holds a call for the guild. Returns whether there was one.
    pub async fn drop_call(&self, ctx: &Context, guild_id: GuildId) -> Result<bool> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

        if manager.get(guild_id).is_none() {
            return Ok(false);
        }
        manager.remove(guild_id).await?;
        Ok(true)
    }

    pub fn forget_connection(&self, guild_id: GuildId) {
        self.connections.remove(&guild_id);
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Drops the guild's session when the bot itself leaves voice: kicked, its channel
    /// deleted, or after an idle disconnect.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id.or_else(|| old.and_then(|o| o.guild_id)) else {
            return;
        };

        // A /play may already have rejoined before this event arrived.
        if let Some(manager) = songbird::get(&ctx).await {
            if let Some(call) = manager.get(guild_id) {
                if call.lock().await.current_channel().is_some() {
                    debug!("Stale voice disconnect for guild {}, already rejoined", guild_id);
                    return;
                }
            }
        }

        self.forget_connection(guild_id);
        if self.player.forget(guild_id) {
            info!("🔌 Disconnected from voice in guild {}, session dropped", guild_id);
        }
    }
}
