//! Track Resolver.
//!
//! Turns a `/play` query into playable tracks. Plain text and YouTube links go straight
//! to yt-dlp; Spotify links are looked up in the Spotify Web API and searched on
//! YouTube by artist and title.

pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::{audio::queue::Track, config::Config, error::ResolveError};

pub use spotify::SpotifyClient;
pub use youtube::YtDlpClient;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:(?:www|m|music)\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[A-Za-z0-9_-]+")
        .expect("valid youtube regex")
});

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/(?:intl-[a-z]+/)?(track|playlist)/([A-Za-z0-9]+)")
        .expect("valid spotify regex")
});

/// Words that mark an edited version of a song.
const EDITED_MARKERS: [&str; 3] = ["clean", "censored", "radio edit"];

/// What a `/play` query refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    YouTubeUrl(String),
    SpotifyTrack(String),
    SpotifyPlaylist(String),
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Result<Self, ResolveError> {
        let query = query.trim();

        if let Some(caps) = SPOTIFY_URL.captures(query) {
            let id = caps[2].to_string();
            return Ok(match &caps[1] {
                "track" => Self::SpotifyTrack(id),
                _ => Self::SpotifyPlaylist(id),
            });
        }
        if YOUTUBE_URL.is_match(query) {
            return Ok(Self::YouTubeUrl(query.to_string()));
        }
        if is_web_link(query) {
            return Err(ResolveError::UnsupportedLink);
        }
        if query.is_empty() {
            return Err(ResolveError::NothingFound(String::new()));
        }

        Ok(Self::Search(query.to_string()))
    }
}

fn is_web_link(query: &str) -> bool {
    url::Url::parse(query).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Builds the YouTube search used for a Spotify entry.
pub fn spotify_search_query(artist: &str, title: &str) -> String {
    format!("{artist} - {title} official audio")
}

/// Whether a search result looks like an edited version of a song.
pub fn is_edited_version(title: &str) -> bool {
    let title = title.to_lowercase();
    EDITED_MARKERS.iter().any(|marker| title.contains(marker))
}

/// Looks up one playable track for a yt-dlp target (a URL or a `ytsearch:` query).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackLookup: Send + Sync {
    async fn lookup(&self, target: &str) -> Result<Option<Track>, ResolveError>;
}

/// Result of resolving a `/play` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Track(Track),
    /// YouTube searches for each playlist entry, to be resolved one at a time with
    /// [`SourceManager::resolve_search`].
    Playlist(Vec<String>),
}

pub struct SourceManager {
    lookup: Arc<dyn TrackLookup>,
    spotify: Option<SpotifyClient>,
}

impl SourceManager {
    pub fn new(lookup: Arc<dyn TrackLookup>, spotify: Option<SpotifyClient>) -> Self {
        Self { lookup, spotify }
    }

    pub fn from_config(config: &Config) -> Self {
        let spotify = config.spotify.as_ref().map(|credentials| {
            SpotifyClient::new(
                credentials.client_id.clone(),
                credentials.client_secret.clone(),
            )
        });
        Self::new(Arc::new(YtDlpClient::new(config.ytdlp_path.clone())), spotify)
    }

    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let kind = QueryKind::classify(query)?;
        debug!("🔎 Resolving {:?}", kind);

        match kind {
            QueryKind::YouTubeUrl(url) => self
                .fetch(&url, query)
                .await
                .map(Resolution::Track),
            QueryKind::Search(text) => self.resolve_search(&text).await.map(Resolution::Track),
            QueryKind::SpotifyTrack(id) => {
                let spotify = self.spotify.as_ref().ok_or(ResolveError::SpotifyDisabled)?;
                let entry = spotify
                    .track(&id)
                    .await?
                    .ok_or_else(|| ResolveError::NothingFound(query.to_string()))?;
                self.resolve_search(&spotify_search_query(&entry.artist, &entry.title))
                    .await
                    .map(Resolution::Track)
            }
            QueryKind::SpotifyPlaylist(id) => {
                let spotify = self.spotify.as_ref().ok_or(ResolveError::SpotifyDisabled)?;
                let entries = spotify.playlist(&id).await?;
                if entries.is_empty() {
                    return Err(ResolveError::NothingFound(query.to_string()));
                }
                info!("📋 Spotify playlist {} has {} entries", id, entries.len());
                Ok(Resolution::Playlist(
                    entries
                        .iter()
                        .map(|entry| spotify_search_query(&entry.artist, &entry.title))
                        .collect(),
                ))
            }
        }
    }

    /// Resolves free text through a YouTube search.
    pub async fn resolve_search(&self, text: &str) -> Result<Track, ResolveError> {
        self.fetch(&format!("ytsearch:{text}"), text).await
    }

    async fn fetch(&self, target: &str, shown_as: &str) -> Result<Track, ResolveError> {
        self.lookup
            .lookup(target)
            .await?
            .ok_or_else(|| ResolveError::NothingFound(shown_as.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_links_and_text() {
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            QueryKind::YouTubeUrl("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into())
        );
        assert_eq!(
            QueryKind::classify("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            QueryKind::YouTubeUrl("https://youtu.be/dQw4w9WgXcQ".into())
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=x").unwrap(),
            QueryKind::SpotifyTrack("4uLU6hMCjMI75M1A2tKUQC".into())
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            QueryKind::SpotifyPlaylist("37i9dQZF1DXcBWIGoYBM5M".into())
        );
        assert_eq!(
            QueryKind::classify("  never gonna give you up ").unwrap(),
            QueryKind::Search("never gonna give you up".into())
        );
    }

    #[test]
    fn test_other_links_are_rejected() {
        assert!(matches!(
            QueryKind::classify("https://soundcloud.com/artist/song"),
            Err(ResolveError::UnsupportedLink)
        ));
        assert!(matches!(
            QueryKind::classify("http://open.spotify.com/album/123"),
            Err(ResolveError::UnsupportedLink)
        ));
    }

    #[test]
    fn test_edited_versions_are_detected() {
        assert!(is_edited_version("Song (Clean)"));
        assert!(is_edited_version("Song - Radio Edit"));
        assert!(!is_edited_version("Song (Official Audio)"));
    }

    #[tokio::test]
    async fn test_search_goes_through_ytsearch() {
        let mut lookup = MockTrackLookup::new();
        lookup
            .expect_lookup()
            .with(eq("ytsearch:lofi beats"))
            .times(1)
            .returning(|_| Ok(Some(Track::new("https://cdn/lofi.m4a", Some("Lofi".into())))));

        let manager = SourceManager::new(Arc::new(lookup), None);
        let resolved = manager.resolve("lofi beats").await.unwrap();

        assert_eq!(
            resolved,
            Resolution::Track(Track::new("https://cdn/lofi.m4a", Some("Lofi".into())))
        );
    }

    #[tokio::test]
    async fn test_youtube_links_are_passed_verbatim() {
        let url = "https://youtu.be/dQw4w9WgXcQ";
        let mut lookup = MockTrackLookup::new();
        lookup
            .expect_lookup()
            .with(eq(url))
            .times(1)
            .returning(|_| Ok(None));

        let manager = SourceManager::new(Arc::new(lookup), None);

        match manager.resolve(url).await {
            Err(ResolveError::NothingFound(shown)) => assert_eq!(shown, url),
            other => panic!("expected NothingFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spotify_links_need_credentials() {
        let manager = SourceManager::new(Arc::new(MockTrackLookup::new()), None);

        assert!(matches!(
            manager.resolve("https://open.spotify.com/track/abc").await,
            Err(ResolveError::SpotifyDisabled)
        ));
    }

    #[test]
    fn test_spotify_search_query_format() {
        assert_eq!(
            spotify_search_query("Daft Punk", "One More Time"),
            "Daft Punk - One More Time official audio"
        );
    }
}
