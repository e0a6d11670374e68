use serde::Deserialize;
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info};

use crate::error::ResolveError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";
/// Only the first page of a playlist is read.
const PLAYLIST_PAGE_SIZE: u32 = 100;
/// Refresh the token slightly before Spotify expires it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Artist and title of a Spotify track, enough to search for it elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyEntry {
    pub artist: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    /// Null for removed or local tracks.
    track: Option<SpotifyTrack>,
}

impl SpotifyTrack {
    fn into_entry(self) -> Option<SpotifyEntry> {
        let artist = self.artists.into_iter().next()?.name;
        Some(SpotifyEntry {
            artist,
            title: self.name,
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client using the client credentials flow.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Requesting Spotify access token");
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ResolveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_URL}{path}"))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// Looks up one track. `None` when Spotify does not know the id.
    pub async fn track(&self, id: &str) -> Result<Option<SpotifyEntry>, ResolveError> {
        let track: Option<SpotifyTrack> = self.get(&format!("/tracks/{id}"), &[]).await?;
        Ok(track.and_then(SpotifyTrack::into_entry))
    }

    /// First page of a playlist's tracks, in playlist order.
    pub async fn playlist(&self, id: &str) -> Result<Vec<SpotifyEntry>, ResolveError> {
        let page: Option<PlaylistPage> = self
            .get(
                &format!("/playlists/{id}/tracks"),
                &[("limit", PLAYLIST_PAGE_SIZE.to_string())],
            )
            .await?;

        let entries = page_entries(page.unwrap_or(PlaylistPage { items: Vec::new() }));
        info!("📋 Read {} tracks from Spotify playlist {}", entries.len(), id);
        Ok(entries)
    }
}

fn page_entries(page: PlaylistPage) -> Vec<SpotifyEntry> {
    page.items
        .into_iter()
        .filter_map(|item| item.track?.into_entry())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_track_uses_first_artist() {
        let track: SpotifyTrack = serde_json::from_str(
            r#"{"name":"Get Lucky","artists":[{"name":"Daft Punk"},{"name":"Pharrell Williams"}]}"#,
        )
        .unwrap();

        assert_eq!(
            track.into_entry(),
            Some(SpotifyEntry {
                artist: "Daft Punk".into(),
                title: "Get Lucky".into()
            })
        );
    }

    #[test]
    fn test_playlist_skips_unavailable_items() {
        let page: PlaylistPage = serde_json::from_str(
            r#"{"items":[
                {"track":{"name":"One","artists":[{"name":"A"}]}},
                {"track":null},
                {"track":{"name":"No artist","artists":[]}},
                {"track":{"name":"Two","artists":[{"name":"B"}]}}
            ]}"#,
        )
        .unwrap();

        let titles: Vec<_> = page_entries(page).into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }
}
