use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{is_edited_version, TrackLookup};
use crate::{audio::queue::Track, error::ResolveError};

const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// Resolves URLs and `ytsearch:` queries by shelling out to yt-dlp.
pub struct YtDlpClient {
    executable: String,
    // Limit concurrent yt-dlp processes to avoid rate limiting
    rate_limiter: tokio::sync::Semaphore,
}

/// Information extracted from yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    /// Direct media URL of the selected format.
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
}

impl YtDlpClient {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Runs `yt-dlp --version`.
    pub async fn version(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.executable).arg("--version").output().await?;
        if !output.status.success() {
            return Err(ResolveError::Lookup(format!(
                "{} --version exited with {}",
                self.executable, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn dump_json(&self, target: &str) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;

        debug!("📊 Running yt-dlp for: {}", target);

        let output = Command::new(&self.executable)
            .args([
                "--dump-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                AUDIO_FORMAT,
                target,
            ])
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp failed for {}: {}", target, error.trim());
            return Err(ResolveError::Lookup(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Picks the first usable entry from yt-dlp's line-delimited JSON output.
fn first_playable(stdout: &str) -> Option<Track> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter(|info| {
            !info
                .title
                .as_deref()
                .is_some_and(is_edited_version)
        })
        .find_map(info_to_track)
}

fn info_to_track(info: YtDlpInfo) -> Option<Track> {
    let mut track = Track::new(info.url?, info.title);

    if let Some(page) = info.webpage_url {
        track = track.with_page_url(page);
    }

    if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(duration));
    }

    Some(track)
}

#[async_trait]
impl TrackLookup for YtDlpClient {
    async fn lookup(&self, target: &str) -> Result<Option<Track>, ResolveError> {
        let stdout = self.dump_json(target).await?;
        let track = first_playable(&stdout);

        match &track {
            Some(track) => info!("🔍 Resolved {} to: {}", target, track.title),
            None => debug!("No playable result for {}", target),
        }

        Ok(track)
    }
}
