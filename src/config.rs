use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::timer::DEFAULT_IDLE_DELAY;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Slash commands registered for one guild only

    // Playback
    pub idle_disconnect_delay: Duration,
    pub skip_settle_delay: Duration,
    pub max_queue_size: usize,
    pub playlist_enqueue_delay: Duration,

    // Sources
    pub ytdlp_path: String,
    pub spotify: Option<SpotifyCredentials>,
}

#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

const MAX_SKIP_SETTLE_DELAY: Duration = Duration::from_secs(10);

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let spotify = match (var("SPOTIFY_CLIENT_ID"), var("SPOTIFY_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => anyhow::bail!(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together"
            ),
        };

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: var("GUILD_ID")
                .map(|s| s.trim().parse())
                .transpose()
                .context("GUILD_ID must be a numeric guild id")?,

            idle_disconnect_delay: parse_duration(
                var("IDLE_DISCONNECT_DELAY"),
                "IDLE_DISCONNECT_DELAY",
                defaults.idle_disconnect_delay,
            )?,
            skip_settle_delay: parse_duration(
                var("SKIP_SETTLE_DELAY"),
                "SKIP_SETTLE_DELAY",
                defaults.skip_settle_delay,
            )?,
            max_queue_size: var("MAX_QUEUE_SIZE")
                .map(|s| s.trim().parse())
                .transpose()
                .context("MAX_QUEUE_SIZE must be a positive integer")?
                .unwrap_or(defaults.max_queue_size),
            playlist_enqueue_delay: parse_duration(
                var("PLAYLIST_ENQUEUE_DELAY"),
                "PLAYLIST_ENQUEUE_DELAY",
                defaults.playlist_enqueue_delay,
            )?,

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            spotify,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The idle disconnect delay must be non-zero
    /// - The skip settle delay must not exceed 10 seconds
    /// - The queue capacity must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.idle_disconnect_delay.is_zero() {
            anyhow::bail!("Idle disconnect delay must be greater than 0");
        }

        if self.skip_settle_delay > MAX_SKIP_SETTLE_DELAY {
            anyhow::bail!(
                "Skip settle delay cannot exceed {}, got: {}",
                humantime::format_duration(MAX_SKIP_SETTLE_DELAY),
                humantime::format_duration(self.skip_settle_delay)
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging. Secrets are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Playback: idle disconnect after {}, skip settle {}, queue limit {}\n  \
            Sources: yt-dlp at '{}', Spotify={}, playlist delay {}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("for guild {id}")),
            humantime::format_duration(self.idle_disconnect_delay),
            humantime::format_duration(self.skip_settle_delay),
            self.max_queue_size,
            self.ytdlp_path,
            self.spotify.is_some(),
            humantime::format_duration(self.playlist_enqueue_delay),
        )
    }
}

fn parse_duration(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{key} must be a duration like '300s' or '5m', got '{raw}'")),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Playback defaults
            idle_disconnect_delay: DEFAULT_IDLE_DELAY,
            skip_settle_delay: Duration::from_millis(500),
            max_queue_size: 1000,
            playlist_enqueue_delay: Duration::from_millis(300),

            // Source defaults
            ytdlp_path: "yt-dlp".to_string(),
            spotify: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply() {
        let config = load(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.guild_id, None);
        assert_eq!(config.idle_disconnect_delay, Duration::from_secs(300));
        assert_eq!(config.skip_settle_delay, Duration::from_millis(500));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.spotify.is_none());
    }

    #[test]
    fn test_token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_durations_use_humantime() {
        let config = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("IDLE_DISCONNECT_DELAY", "2m 30s"),
            ("SKIP_SETTLE_DELAY", "250ms"),
            ("GUILD_ID", "123456789"),
        ])
        .unwrap();

        assert_eq!(config.idle_disconnect_delay, Duration::from_secs(150));
        assert_eq!(config.skip_settle_delay, Duration::from_millis(250));
        assert_eq!(config.guild_id, Some(123456789));

        assert!(load(&[("DISCORD_TOKEN", "abc"), ("IDLE_DISCONNECT_DELAY", "soon")]).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("IDLE_DISCONNECT_DELAY", "0s")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("SKIP_SETTLE_DELAY", "11s")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "0")]).is_err());
    }

    #[test]
    fn test_spotify_credentials_come_in_pairs() {
        assert!(load(&[("DISCORD_TOKEN", "abc"), ("SPOTIFY_CLIENT_ID", "id")]).is_err());

        let config = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "shh"),
        ])
        .unwrap();
        let spotify = config.spotify.unwrap();
        assert_eq!(spotify.client_id, "id");
        assert!(!format!("{spotify:?}").contains("shh"));
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = load(&[
            ("DISCORD_TOKEN", "super-secret"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "shh"),
        ])
        .unwrap();
        let summary = config.summary();

        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("shh"));
        assert!(summary.contains("queue limit 1000"));
    }
}
